use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use super::error::{Result, UpgradeError};
use super::models::{DeviceInternalId, JobId, MEMBERSHIP_KEY, MembershipItem};
use super::remote::{HttpFailure, expect_ok};
use super::session::Session;

/// Replace the job's device membership with `device_ids`.
///
/// Full read-modify-write: the fetched record goes back with only the
/// membership list swapped out. Every other attribute, including key order,
/// is sent back as received.
pub async fn set_membership(
    session: &Session<'_>,
    job_id: JobId,
    device_ids: &[DeviceInternalId],
) -> Result<()> {
    let fetch_failed = |failure: HttpFailure| {
        error!(
            operation = "fetch job",
            job_id,
            status = ?failure.status(),
            error = %failure,
            "Failed to fetch job details"
        );
        UpgradeError::JobFetch { job_id, failure }
    };

    let reply = expect_ok(session.fetch_job(job_id).await).map_err(fetch_failed)?;
    let record: Value = reply
        .json()
        .map_err(|e| fetch_failed(HttpFailure::malformed(&reply, e)))?;

    let record = with_membership(record, device_ids)
        .map_err(|e| fetch_failed(HttpFailure::malformed(&reply, e)))?;

    expect_ok(session.update_job(&record).await).map_err(|failure| {
        error!(
            operation = "update job",
            job_id,
            status = ?failure.status(),
            error = %failure,
            "Failed to update job devices"
        );
        UpgradeError::JobUpdate { job_id, failure }
    })?;

    info!(job_id, devices = device_ids.len(), "Added devices to job");
    Ok(())
}

/// Why a fetched job record cannot take a new membership list.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("job record is not a JSON object")]
    NotAnObject,
    #[error("cannot encode membership list: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Swap the membership list of a job record. The record must be a JSON object.
pub fn with_membership(
    mut record: Value,
    device_ids: &[DeviceInternalId],
) -> std::result::Result<Value, RecordError> {
    let object = record.as_object_mut().ok_or(RecordError::NotAnObject)?;

    let items = device_ids
        .iter()
        .map(|&id| MembershipItem::device(id))
        .collect::<Vec<_>>();
    let items = serde_json::to_value(items)?;

    object.insert(MEMBERSHIP_KEY.to_string(), items);
    Ok(record)
}
