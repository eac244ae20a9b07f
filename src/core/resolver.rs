//! Mapping of caller-facing names to the service's internal ids.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::error::{Result, UpgradeError};
use super::models::{DeviceInternalId, JobId, JobSummary};
use super::remote::{HttpFailure, expect_ok};
use super::session::Session;

/// Resolve external device ids to internal ids, at most `concurrency` lookups in flight.
///
/// Individual failures are logged and skipped. The result is a set, so it does
/// not depend on completion order and two external ids naming the same device
/// collapse into one entry. An empty result is left for the caller to judge.
pub async fn resolve_devices(
    session: &Session<'_>,
    external_ids: &[String],
    concurrency: usize,
) -> BTreeSet<DeviceInternalId> {
    let resolved: BTreeSet<DeviceInternalId> = stream::iter(external_ids)
        .map(|external_id| resolve_device(session, external_id))
        .buffer_unordered(concurrency.max(1))
        .filter_map(|id| async move { id })
        .collect()
        .await;

    info!(
        resolved = resolved.len(),
        requested = external_ids.len(),
        "Resolved device IDs"
    );
    resolved
}

/// Look up one device. `None` means the device is skipped.
pub async fn resolve_device(session: &Session<'_>, external_id: &str) -> Option<DeviceInternalId> {
    let reply = match expect_ok(session.lookup_device(external_id).await) {
        Ok(reply) => reply,
        Err(failure) => {
            warn!(
                external_id = %external_id,
                status = ?failure.status(),
                error = %failure,
                "Device lookup failed"
            );
            return None;
        }
    };

    let Ok(body) = reply.json::<Value>() else {
        warn!(external_id = %external_id, "Non-JSON device response");
        return None;
    };

    let Some(first) = body.as_array().and_then(|entries| entries.first()) else {
        warn!(external_id = %external_id, "No device found for external ID");
        return None;
    };

    match first.get("deviceId").and_then(Value::as_i64) {
        Some(id) => {
            debug!(external_id = %external_id, device_id = id, "Device resolved");
            Some(id)
        }
        None => {
            warn!(external_id = %external_id, "Device record has no deviceId");
            None
        }
    }
}

/// Find the job named exactly `job_name` in the full job listing.
pub async fn resolve_job(session: &Session<'_>, job_name: &str) -> Result<JobId> {
    let reply = expect_ok(session.list_jobs().await).map_err(|failure| {
        error!(
            operation = "list jobs",
            status = ?failure.status(),
            error = %failure,
            "Failed to retrieve job list"
        );
        UpgradeError::JobList(failure)
    })?;

    let jobs: Vec<JobSummary> = reply.json().map_err(|e| {
        let failure = HttpFailure::malformed(&reply, e);
        error!(operation = "list jobs", error = %failure, "Job list unusable");
        UpgradeError::MalformedResponse {
            operation: "list jobs",
            reason: failure.to_string(),
        }
    })?;

    let found = jobs
        .iter()
        .filter(|job| job.name.as_deref() == Some(job_name))
        .find_map(|job| job.job_id);

    match found {
        Some(job_id) => {
            info!(job = %job_name, job_id, "Found job");
            Ok(job_id)
        }
        None => {
            error!(job = %job_name, jobs_listed = jobs.len(), "Job not found");
            Err(UpgradeError::JobNotFound(job_name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedBackbox;
    use crate::core::remote::HttpReply;
    use crate::core::session::login;
    use serde_json::json;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn unresolvable_devices_are_skipped() {
        let backbox = SimulatedBackbox::new()
            .with_device("D1", 101)
            .with_device_reply("D2", HttpReply::new(200, "[]"))
            .with_device_reply("D3", HttpReply::new(500, "boom"))
            .with_device_reply("D4", HttpReply::new(200, "<html>"))
            .with_device("D5", 105);
        let session = login(&backbox, "u", "p").await.unwrap();

        let external_ids = ids(&["D1", "D2", "D3", "D4", "D5", "D6"]);
        let resolved = resolve_devices(&session, &external_ids, 3).await;

        assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec![101, 105]);
    }

    #[tokio::test]
    async fn resolution_is_independent_of_concurrency() {
        let mut backbox = SimulatedBackbox::new();
        let mut external = Vec::new();
        for n in 0..40 {
            backbox = backbox.with_device(&format!("DEV{n}"), 1000 + n);
            external.push(format!("DEV{n}"));
        }
        let session = login(&backbox, "u", "p").await.unwrap();

        let sequential = resolve_devices(&session, &external, 1).await;
        let parallel = resolve_devices(&session, &external, 16).await;

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 40);
    }

    #[tokio::test]
    async fn duplicate_internal_ids_collapse() {
        let backbox = SimulatedBackbox::new().with_device("A", 7).with_device("B", 7);
        let session = login(&backbox, "u", "p").await.unwrap();

        let resolved = resolve_devices(&session, &ids(&["A", "B"]), 4).await;
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn first_element_wins() {
        let backbox = SimulatedBackbox::new().with_device_reply(
            "D1",
            HttpReply::new(200, json!([{"deviceId": 9}, {"deviceId": 10}]).to_string()),
        );
        let session = login(&backbox, "u", "p").await.unwrap();

        assert_eq!(resolve_device(&session, "D1").await, Some(9));
    }

    #[tokio::test]
    async fn job_name_match_is_exact() {
        let backbox = SimulatedBackbox::new()
            .with_job("nightly-upgrade", 54, json!({}))
            .with_job("Nightly-Upgrade", 55, json!({}));
        let session = login(&backbox, "u", "p").await.unwrap();

        assert_eq!(resolve_job(&session, "Nightly-Upgrade").await.unwrap(), 55);

        let err = resolve_job(&session, "Nightly").await.unwrap_err();
        assert!(matches!(err, UpgradeError::JobNotFound(ref name) if name == "Nightly"));
        assert_eq!(err.exit_code(), 7);
    }

    #[tokio::test]
    async fn job_entries_without_id_are_passed_over() {
        let backbox = SimulatedBackbox::new().with_jobs_reply(HttpReply::new(
            200,
            json!([
                {"name": "Upgrade", "backup_JOB_ID": null},
                {"name": "Upgrade", "backup_JOB_ID": 12}
            ])
            .to_string(),
        ));
        let session = login(&backbox, "u", "p").await.unwrap();

        assert_eq!(resolve_job(&session, "Upgrade").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn job_list_failure_is_service_error() {
        let backbox = SimulatedBackbox::new().with_jobs_reply(HttpReply::new(503, "maintenance"));
        let session = login(&backbox, "u", "p").await.unwrap();

        let err = resolve_job(&session, "Upgrade").await.unwrap_err();
        assert!(matches!(err, UpgradeError::JobList(_)));
        assert_eq!(err.exit_code(), 6);
    }
}
