//! Rebinding a job's dynamic field to the uploaded artifact.
//!
//! Descriptors returned by the discovery endpoint carry several integer
//! attributes whose keys look like ids (`dynamicFieldID`, `typeId`, ...) and
//! the service does not say which one the update endpoint wants. Every such
//! attribute of the matching descriptor is a candidate; they are tried in the
//! order the service lists them until one is accepted.

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::error::{Result, UpgradeError};
use super::models::{DynamicFieldUpdate, FIELD_DISPLAY_NAME_KEY, JobId};
use super::remote::{HttpFailure, expect_ok};
use super::session::Session;

/// Decoded discovery response. Kept as raw maps so unknown attributes and their order survive.
pub type FieldDescriptor = Map<String, Value>;

/// Set `field_display_name` on `job_id` to `value`.
///
/// Returns the field id the service accepted.
pub async fn update_field(
    session: &Session<'_>,
    job_id: JobId,
    value: &str,
    field_display_name: &str,
    id_override: Option<&str>,
) -> Result<i64> {
    let descriptors = discover_fields(session, job_id).await?;
    debug!(job_id, fields = ?descriptors, "Dynamic fields fetched");

    let candidates = match parse_override(id_override) {
        Some(id) => {
            info!(field_id = id, "Using override dynamic field ID");
            vec![id]
        }
        None => {
            let candidates = candidate_ids(&descriptors, field_display_name)?;
            info!(
                field = %field_display_name,
                candidates = ?candidates,
                "Candidate dynamic field IDs"
            );
            candidates
        }
    };

    for &candidate in &candidates {
        info!(field_id = candidate, "Attempting dynamic field update");
        let payload = serde_json::to_value(DynamicFieldUpdate::single(job_id, candidate, value))
            .map_err(|e| UpgradeError::MalformedResponse {
                operation: "update dynamic field",
                reason: e.to_string(),
            })?;

        match expect_ok(session.update_dynamic_fields(&payload).await) {
            Ok(_) => {
                info!(
                    field = %field_display_name,
                    value = %value,
                    field_id = candidate,
                    "Dynamic field updated"
                );
                return Ok(candidate);
            }
            Err(failure) => {
                warn!(
                    field_id = candidate,
                    status = ?failure.status(),
                    error = %failure,
                    "Update attempt failed"
                );
            }
        }
    }

    error!(
        operation = "update dynamic field",
        candidates = ?candidates,
        "All dynamic field update attempts failed"
    );
    Err(UpgradeError::AllCandidatesFailed { candidates })
}

/// Fetch the job's field descriptors. The endpoint is a PUT that wants an empty filter body.
pub async fn discover_fields(session: &Session<'_>, job_id: JobId) -> Result<Vec<FieldDescriptor>> {
    let fetch_failed = |failure: HttpFailure| {
        error!(
            operation = "fetch dynamic fields",
            job_id,
            status = ?failure.status(),
            error = %failure,
            "Failed to fetch dynamic fields"
        );
        UpgradeError::DynamicFieldFetch { job_id, failure }
    };

    let reply = expect_ok(session.get_dynamic_fields(job_id).await).map_err(fetch_failed)?;
    let fields: Vec<Value> = reply
        .json()
        .map_err(|e| fetch_failed(HttpFailure::malformed(&reply, e)))?;

    Ok(fields
        .into_iter()
        .filter_map(|field| match field {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

/// An override that does not parse as an integer is ignored, as is an empty one.
pub fn parse_override(raw: Option<&str>) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(value = %raw, "Invalid DYNAMIC_FIELD_ID override ignored");
            None
        }
    }
}

/// Id-like integer attributes of the first descriptor named `display_name`, in attribute order.
///
/// A named descriptor without any such attribute is reported the same way as a missing one.
pub fn candidate_ids(descriptors: &[FieldDescriptor], display_name: &str) -> Result<Vec<i64>> {
    let candidates = descriptors
        .iter()
        .find(|field| {
            field.get(FIELD_DISPLAY_NAME_KEY).and_then(Value::as_str) == Some(display_name)
        })
        .map(id_like_values)
        .unwrap_or_default();

    if candidates.is_empty() {
        let available = available_names(descriptors);
        error!(field = %display_name, available = %available.join(", "), "Dynamic field not found");
        return Err(UpgradeError::FieldNotFound {
            name: display_name.to_string(),
            available,
        });
    }
    Ok(candidates)
}

fn id_like_values(field: &FieldDescriptor) -> Vec<i64> {
    field
        .iter()
        .filter(|(key, _)| key.to_lowercase().contains("id"))
        .filter_map(|(_, value)| value.as_i64())
        .collect()
}

fn available_names(descriptors: &[FieldDescriptor]) -> Vec<String> {
    descriptors
        .iter()
        .map(|field| match field.get(FIELD_DISPLAY_NAME_KEY) {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => "<none>".to_string(),
        })
        .collect()
}
