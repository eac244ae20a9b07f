//! Command-line surface: argument parsing, one run, and the exit-code contract.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adapters::{self, SimulatedBackbox};
use crate::config::RunConfig;
use crate::core::{Orchestrator, RunReport, UpgradeError};
use crate::devices::read_devices;

#[derive(Parser)]
#[command(name = "backbox-upgrade")]
#[command(about = "Roll out a device OS upgrade through a BackBox job", long_about = None)]
pub struct Cli {
    /// TOML file with settings; environment and flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run against an in-memory BackBox seeded from the configuration
    #[arg(long)]
    pub simulation: bool,

    #[arg(long)]
    pub verbose: bool,

    #[arg(long)]
    pub json_logs: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Args, Serialize)]
pub struct ConfigOverrides {
    #[serde(rename = "backbox_ip", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    host: Option<String>,

    #[serde(rename = "backbox_user", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    user: Option<String>,

    #[serde(rename = "job_to_execute", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    job: Option<String>,

    #[serde(rename = "job_file_name", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    file: Option<String>,

    #[serde(rename = "devices_file", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    devices: Option<String>,

    #[serde(rename = "dynamic_field_name", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    field_name: Option<String>,

    #[serde(rename = "dynamic_field_id", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    field_id: Option<String>,

    #[serde(rename = "verify_ssl", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verify_tls: Option<bool>,

    #[serde(rename = "lookup_concurrency", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    concurrency: Option<usize>,

    #[serde(rename = "request_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    timeout_secs: Option<u64>,
}

/// Run once, stopping early on Ctrl-C, and return the process exit code.
pub async fn execute(cli: &Cli) -> u8 {
    execute_until(cli, ctrl_c()).await
}

/// Like [`execute`], with `interrupt` standing in for Ctrl-C.
pub async fn execute_until(cli: &Cli, interrupt: impl Future<Output = ()>) -> u8 {
    match run(cli, interrupt).await {
        Ok(report) => {
            info!(
                artifact_id = %report.artifact_id,
                job_id = report.job_id,
                field_id = report.field_id,
                devices = report.devices_resolved,
                requested = report.devices_requested,
                "Upgrade job prepared"
            );
            0
        }
        Err(err) => exit_code(&err),
    }
}

pub async fn run(cli: &Cli, interrupt: impl Future<Output = ()>) -> Result<RunReport> {
    let config = RunConfig::new(cli.config.as_deref(), Some(&cli.overrides))
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    debug!(config = ?config, "Configuration resolved");

    let devices = read_devices(&config.devices_file)
        .inspect_err(|e| error!(error = %e, "No devices to process"))?;

    let simulation = cli.simulation.then(|| {
        warn!("Simulation mode: no requests will reach BackBox");
        SimulatedBackbox::seeded(&config.job_name, &config.field_display_name, &devices)
    });
    let backbox = adapters::get_backbox(config.http_settings(), simulation)
        .map_err(|e| UpgradeError::Config(e.to_string()))
        .context("Failed to build BackBox client")?;

    let orchestrator = Orchestrator::new(backbox.as_ref(), config.plan());

    tokio::select! {
        biased;
        _ = interrupt => {
            warn!("Interrupted by user");
            Err(UpgradeError::Interrupted.into())
        }
        result = orchestrator.run(&devices) => Ok(result.map_err(|failure| failure.error)?),
    }
}

/// Exit code for a failed run: the upgrade error's own code wherever it sits in
/// the context chain, 1 for anything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<UpgradeError>() {
        Some(upgrade) => upgrade.exit_code(),
        None => {
            error!(error = %format!("{err:#}"), "Unexpected failure");
            1
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the run is never interrupted.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_errors_keep_their_code_under_context() {
        let err = anyhow::Error::new(UpgradeError::JobNotFound("Nightly".into()))
            .context("while preparing the job");
        assert_eq!(exit_code(&err), 7);

        let err = anyhow::Error::new(UpgradeError::Interrupted).context("run aborted");
        assert_eq!(exit_code(&err), 130);
    }

    #[test]
    fn other_errors_exit_with_one() {
        assert_eq!(exit_code(&anyhow::anyhow!("socket closed")), 1);
    }

    #[test]
    fn overrides_serialize_only_given_flags() {
        let cli = Cli::parse_from(["backbox-upgrade", "--job", "Nightly", "--concurrency", "3"]);
        let value = serde_json::to_value(&cli.overrides).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"job_to_execute": "Nightly", "lookup_concurrency": 3})
        );
    }
}
