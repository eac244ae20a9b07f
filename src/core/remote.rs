//! The seam between the upgrade pipeline and the BackBox REST service.
//!
//! Every remote operation the pipeline performs goes through [`BackboxApi`].
//! Implementations only move bytes: they report the HTTP status and body text
//! and leave judging the reply (ok predicate, JSON shape) to the pipeline
//! stages in `core`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Maximum number of characters of a response body kept for diagnostics.
pub const BODY_EXCERPT_CHARS: usize = 200;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx and 3xx count as success; anything from 400 up is a failure.
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn body_excerpt(&self) -> String {
        excerpt(&self.body)
    }
}

/// The request never produced a reply (connect failure, timeout, TLS error...).
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

pub type ApiResult = Result<HttpReply, TransportError>;

/// Why a single remote call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpFailure {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(String),

    #[error("HTTP {status}: unexpected response body ({reason})")]
    Malformed { status: u16, reason: String },
}

impl HttpFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Malformed { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    pub fn malformed(reply: &HttpReply, reason: impl ToString) -> Self {
        Self::Malformed {
            status: reply.status,
            reason: excerpt(&reason.to_string()),
        }
    }
}

impl From<TransportError> for HttpFailure {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.0)
    }
}

/// Collapse a raw call result into an ok reply or the reason it failed.
pub fn expect_ok(result: ApiResult) -> Result<HttpReply, HttpFailure> {
    let reply = result?;
    if reply.is_ok() {
        Ok(reply)
    } else {
        Err(HttpFailure::Status {
            status: reply.status,
            body: reply.body_excerpt(),
        })
    }
}

/// Truncate `text` to [`BODY_EXCERPT_CHARS`] characters without splitting a char.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Operations offered by the BackBox device-management service.
///
/// One method per endpoint. Implementations must be shareable across the
/// concurrent device lookups, so all methods take `&self` and any transport
/// state (cookies) is fixed once `login` has returned.
#[async_trait]
pub trait BackboxApi: Send + Sync {
    /// `GET /` to pick up a session cookie, then the form POST to `/j_security_check`.
    /// The returned reply is the one from the credential POST.
    async fn login(&self, username: &str, password: &str) -> ApiResult;

    /// Multipart upload to `taskfile/0`.
    async fn upload_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult;

    /// `GET devicesbyExternalId/{external_id}`.
    async fn lookup_device(&self, external_id: &str) -> ApiResult;

    /// `GET taskJobs`.
    async fn list_jobs(&self) -> ApiResult;

    /// `GET taskJob/{job_id}`.
    async fn fetch_job(&self, job_id: i64) -> ApiResult;

    /// `PUT taskJob/` with the complete job record.
    async fn update_job(&self, record: &Value) -> ApiResult;

    /// `PUT tasks/jobs/getTaskJobDynamicFields/{job_id}` with an empty filter.
    async fn get_dynamic_fields(&self, job_id: i64) -> ApiResult;

    /// `PUT tasks/jobs/updateTaskJobDynamicFields`.
    async fn update_dynamic_fields(&self, payload: &Value) -> ApiResult;
}
