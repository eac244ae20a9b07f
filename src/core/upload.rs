use std::path::Path;

use serde_json::Value;
use tracing::{error, info};

use super::error::{Result, UpgradeError};
use super::models::ArtifactId;
use super::remote::expect_ok;
use super::session::Session;

/// Push the upgrade artifact to the service in a single attempt.
///
/// The file is read before any network call, so a missing or unreadable file
/// never reaches the service.
pub async fn upload_artifact(session: &Session<'_>, path: &Path) -> Result<ArtifactId> {
    let contents = tokio::fs::read(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Upgrade file not found");
        UpgradeError::FileNotFound {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let file_name = artifact_file_name(path);
    let size = contents.len();

    let reply = expect_ok(session.upload_file(&file_name, contents).await).map_err(|failure| {
        error!(
            operation = "upload",
            status = ?failure.status(),
            error = %failure,
            "File upload failed"
        );
        UpgradeError::Upload(failure)
    })?;

    let id = reply
        .json::<Value>()
        .map_err(|e| malformed(e.to_string()))
        .and_then(|body| {
            artifact_id_from(&body).ok_or_else(|| malformed("missing id".into()))
        })?;

    info!(artifact_id = %id, file = %file_name, bytes = size, "File uploaded successfully");
    Ok(id)
}

/// File name sent with the multipart part: the final path component.
fn artifact_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The service answers with either a string or a numeric `id`; empty or null counts as absent.
fn artifact_id_from(body: &Value) -> Option<ArtifactId> {
    match body.get("id")? {
        Value::String(s) if !s.is_empty() => Some(ArtifactId(s.clone())),
        Value::Number(n) => Some(ArtifactId(n.to_string())),
        _ => None,
    }
}

fn malformed(reason: String) -> UpgradeError {
    error!(operation = "upload", reason = %reason, "Upload response unusable");
    UpgradeError::MalformedResponse {
        operation: "upload",
        reason,
    }
}
