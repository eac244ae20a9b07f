use std::path::PathBuf;

use thiserror::Error;

use super::remote::HttpFailure;

/// A fatal failure of an upgrade run. Each variant maps to its own process exit code.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("device list error: {0}")]
    DeviceList(String),

    #[error("login failed: {0}")]
    Auth(HttpFailure),

    #[error("upgrade file not readable: {}: {reason}", .path.display())]
    FileNotFound { path: PathBuf, reason: String },

    #[error("file upload failed: {0}")]
    Upload(HttpFailure),

    #[error("malformed response from {operation}: {reason}")]
    MalformedResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("no device ids resolved ({requested} external ids looked up)")]
    EmptyResolution { requested: usize },

    #[error("failed to retrieve job list: {0}")]
    JobList(HttpFailure),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("failed to fetch job {job_id}: {failure}")]
    JobFetch { job_id: i64, failure: HttpFailure },

    #[error("failed to update devices of job {job_id}: {failure}")]
    JobUpdate { job_id: i64, failure: HttpFailure },

    #[error("failed to fetch dynamic fields of job {job_id}: {failure}")]
    DynamicFieldFetch { job_id: i64, failure: HttpFailure },

    #[error("dynamic field '{name}' not found; available: {}", .available.join(", "))]
    FieldNotFound { name: String, available: Vec<String> },

    #[error("all dynamic field update attempts failed (tried ids {candidates:?})")]
    AllCandidatesFailed { candidates: Vec<i64> },

    #[error("interrupted")]
    Interrupted,
}

impl UpgradeError {
    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DeviceList(_) => 1,
            Self::Config(_) => 2,
            Self::Auth(_) => 3,
            Self::FileNotFound { .. } => 4,
            Self::Upload(_) => 5,
            Self::JobList(_) => 6,
            Self::JobNotFound(_) => 7,
            Self::JobFetch { .. } => 8,
            Self::JobUpdate { .. } => 9,
            Self::DynamicFieldFetch { .. } => 10,
            Self::FieldNotFound { .. } => 11,
            Self::AllCandidatesFailed { .. } => 12,
            Self::MalformedResponse { .. } => 13,
            Self::EmptyResolution { .. } => 14,
            Self::Interrupted => 130,
        }
    }

    /// HTTP status of the failing call, when there was one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Auth(f) | Self::Upload(f) | Self::JobList(f) => f.status(),
            Self::JobFetch { failure, .. }
            | Self::JobUpdate { failure, .. }
            | Self::DynamicFieldFetch { failure, .. } => failure.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpgradeError>;
