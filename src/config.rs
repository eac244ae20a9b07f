//! Run configuration.
//!
//! Sources, lowest precedence first: an optional TOML file, the process
//! environment (after `.env` has been loaded into it), then CLI overrides.
//! Keys are the environment variable names, lowercased in the TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::adapters::HttpSettings;
use crate::core::{RunPlan, UpgradeError};

pub const DEFAULT_FIELD_NAME: &str = "IOS bin File";
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const REQUIRED_KEYS: [&str; 6] = [
    "BACKBOX_IP",
    "BACKBOX_USER",
    "BACKBOX_PASSWORD",
    "JOB_TO_EXECUTE",
    "JOB_FILE_NAME",
    "DEVICES_FILE",
];

const OPTIONAL_KEYS: [&str; 5] = [
    "DYNAMIC_FIELD_NAME",
    "DYNAMIC_FIELD_ID",
    "VERIFY_SSL",
    "LOOKUP_CONCURRENCY",
    "REQUEST_TIMEOUT_SECS",
];

/// Immutable settings for one run.
#[derive(Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub job_name: String,
    /// `JOB_FILE_NAME` as configured; also the dynamic field's new value.
    pub job_file_name: String,
    pub artifact_path: PathBuf,
    pub devices_file: PathBuf,
    pub field_display_name: String,
    pub field_id_override: Option<String>,
    pub verify_tls: bool,
    pub lookup_concurrency: usize,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("job_name", &self.job_name)
            .field("job_file_name", &self.job_file_name)
            .field("artifact_path", &self.artifact_path)
            .field("devices_file", &self.devices_file)
            .field("field_display_name", &self.field_display_name)
            .field("field_id_override", &self.field_id_override)
            .field("verify_tls", &self.verify_tls)
            .field("lookup_concurrency", &self.lookup_concurrency)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Shape of the merged sources before validation.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    backbox_ip: Option<String>,
    backbox_user: Option<String>,
    backbox_password: Option<String>,
    job_to_execute: Option<String>,
    job_file_name: Option<String>,
    devices_file: Option<String>,
    dynamic_field_name: Option<String>,
    dynamic_field_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    verify_ssl: Option<bool>,
    #[serde(default, deserialize_with = "lenient::number")]
    lookup_concurrency: Option<usize>,
    #[serde(default, deserialize_with = "lenient::number")]
    request_timeout_secs: Option<u64>,
}

impl RunConfig {
    /// Load from the layered sources. `overrides` is serialized over everything else.
    pub fn new<T: Serialize>(
        config_file: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, UpgradeError> {
        let mut figment = Figment::new();

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(UpgradeError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Serialized::defaults(environment()));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Self::from_figment(&figment)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, UpgradeError> {
        let raw: RawConfig = figment
            .extract()
            .map_err(|e| UpgradeError::Config(e.to_string()))?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, UpgradeError> {
        let required = [
            &raw.backbox_ip,
            &raw.backbox_user,
            &raw.backbox_password,
            &raw.job_to_execute,
            &raw.job_file_name,
            &raw.devices_file,
        ];
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .zip(required)
            .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(UpgradeError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let address = raw.backbox_ip.unwrap_or_default();
        let base_url = service_url(&address)?;
        let job_file_name = raw.job_file_name.unwrap_or_default();

        Ok(Self {
            base_url,
            username: raw.backbox_user.unwrap_or_default(),
            password: raw.backbox_password.unwrap_or_default(),
            job_name: raw.job_to_execute.unwrap_or_default(),
            artifact_path: PathBuf::from(&job_file_name),
            job_file_name,
            devices_file: PathBuf::from(raw.devices_file.unwrap_or_default()),
            field_display_name: raw
                .dynamic_field_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_FIELD_NAME.to_string()),
            field_id_override: raw.dynamic_field_id,
            verify_tls: raw.verify_ssl.unwrap_or(false),
            lookup_concurrency: raw
                .lookup_concurrency
                .unwrap_or(DEFAULT_LOOKUP_CONCURRENCY)
                .max(1),
            request_timeout: Duration::from_secs(
                raw.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan {
            username: self.username.clone(),
            password: self.password.clone(),
            job_name: self.job_name.clone(),
            artifact_path: self.artifact_path.clone(),
            field_value: self.job_file_name.clone(),
            field_display_name: self.field_display_name.clone(),
            field_id_override: self.field_id_override.clone(),
            lookup_concurrency: self.lookup_concurrency,
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            base_url: self.base_url.clone(),
            verify_tls: self.verify_tls,
            timeout: self.request_timeout,
        }
    }
}

/// A bare host or IP means HTTPS on that host; a full URL is taken as given.
fn service_url(address: &str) -> Result<Url, UpgradeError> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("https://{address}")
    };
    Url::parse(&candidate)
        .map_err(|e| UpgradeError::Config(format!("invalid BACKBOX_IP '{address}': {e}")))
}

/// Known settings present in the process environment, keyed as in the TOML
/// file. Values stay raw strings: `007` is a password, not the number 7.
fn environment() -> BTreeMap<String, String> {
    REQUIRED_KEYS
        .iter()
        .chain(OPTIONAL_KEYS.iter())
        .filter_map(|key| {
            std::env::var(key)
                .ok()
                .map(|value| (key.to_ascii_lowercase(), value))
        })
        .collect()
}

/// Flags and counts arrive as text from the environment and typed from TOML or flags.
mod lenient {
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    /// Only `true` (any case) enables a flag.
    pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<Option<bool>, D::Error> {
        Ok(Option::<Flag>::deserialize(de)?.map(|value| match value {
            Flag::Bool(b) => b,
            Flag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }))
    }

    /// A blank value counts as unset.
    pub fn number<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + TryFrom<u64>,
    {
        let parsed = match Option::<Count>::deserialize(de)? {
            None => return Ok(None),
            Some(Count::Text(text)) if text.trim().is_empty() => return Ok(None),
            Some(Count::Number(n)) => T::try_from(n).ok(),
            Some(Count::Text(text)) => text.trim().parse().ok(),
        };
        parsed
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected a non-negative whole number"))
    }
}
