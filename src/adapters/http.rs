//! BackBox REST client over `reqwest`.
//!
//! The login handshake leaves its session cookie in the client's cookie store.
//! The store is only written during `login`; afterwards every request, including
//! the concurrent device lookups, reads from it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use crate::core::models::JobId;
use crate::core::remote::{ApiResult, BackboxApi, HttpReply, TransportError};

/// Connection settings for [`HttpBackbox`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: Url,
    pub verify_tls: bool,
    pub timeout: Duration,
}

pub struct HttpBackbox {
    client: Client,
    base: Url,
    internal_api: Url,
    external_api: Url,
}

impl HttpBackbox {
    pub fn new(settings: HttpSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .timeout(settings.timeout)
            .build()?;

        let base = with_trailing_slash(settings.base_url);
        let internal_api = join(&base, "rest/data/")?;
        let external_api = join(&base, "rest/data/api/")?;

        Ok(Self {
            client,
            base,
            internal_api,
            external_api,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn internal(&self, path: &str) -> Result<Url, TransportError> {
        join(&self.internal_api, path)
    }

    fn external(&self, path: &str) -> Result<Url, TransportError> {
        join(&self.external_api, path)
    }

    /// `devicesbyExternalId/{id}` with the id encoded as one path segment.
    fn device_lookup_url(&self, external_id: &str) -> Result<Url, TransportError> {
        let mut url = self.external_api.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError(format!("cannot-be-a-base URL: {}", self.external_api)))?
            .pop_if_empty()
            .push("devicesbyExternalId")
            .push(external_id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!(url = %url, status, bytes = body.len(), "BackBox response");
        Ok(HttpReply { status, body })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn join(base: &Url, path: &str) -> Result<Url, TransportError> {
    base.join(path)
        .map_err(|e| TransportError(format!("invalid URL {base}{path}: {e}")))
}

#[async_trait]
impl BackboxApi for HttpBackbox {
    async fn login(&self, username: &str, password: &str) -> ApiResult {
        // Only establishes the session cookie; its status is not judged.
        let landing = self.send(self.client.get(self.base.clone())).await?;
        debug!(status = landing.status, "Login landing page fetched");

        let url = join(&self.base, "j_security_check")?;
        let form = [("j_username", username), ("j_password", password)];
        self.send(self.client.post(url).form(&form)).await
    }

    async fn upload_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult {
        let part = Part::bytes(contents).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let url = self.internal("taskfile/0")?;
        self.send(self.client.post(url).multipart(form)).await
    }

    async fn lookup_device(&self, external_id: &str) -> ApiResult {
        let url = self.device_lookup_url(external_id)?;
        self.send(self.client.get(url)).await
    }

    async fn list_jobs(&self) -> ApiResult {
        let url = self.external("taskJobs")?;
        self.send(self.client.get(url)).await
    }

    async fn fetch_job(&self, job_id: JobId) -> ApiResult {
        let url = self.external(&format!("taskJob/{job_id}"))?;
        self.send(self.client.get(url)).await
    }

    async fn update_job(&self, record: &Value) -> ApiResult {
        let url = self.external("taskJob/")?;
        self.send(self.client.put(url).json(record)).await
    }

    async fn get_dynamic_fields(&self, job_id: JobId) -> ApiResult {
        let url = self.internal(&format!("tasks/jobs/getTaskJobDynamicFields/{job_id}"))?;
        let empty_filter = Value::Array(Vec::new());
        self.send(self.client.put(url).json(&empty_filter)).await
    }

    async fn update_dynamic_fields(&self, payload: &Value) -> ApiResult {
        let url = self.internal("tasks/jobs/updateTaskJobDynamicFields")?;
        let request = self
            .client
            .put(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(payload);
        self.send(request).await
    }
}
