use serde::{Deserialize, Serialize};

/// Internal id the service assigns to a device.
pub type DeviceInternalId = i64;

/// Internal id of a task job.
pub type JobId = i64;

/// Job record attribute holding the device membership list.
pub const MEMBERSHIP_KEY: &str = "itemsIN_BackupJob";

/// `itemType` tag used for device entries in a job's membership list.
pub const DEVICE_ITEM_TYPE: i64 = 0;

/// Descriptor attribute carrying a dynamic field's display name.
pub const FIELD_DISPLAY_NAME_KEY: &str = "uiName";

/// Opaque identifier returned by the artifact upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactId(pub String);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the `taskJobs` listing. Other attributes are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "backup_JOB_ID", default)]
    pub job_id: Option<JobId>,
}

/// One entry of a job's membership list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipItem {
    pub item_id: DeviceInternalId,
    pub item_type: i64,
}

impl MembershipItem {
    pub fn device(item_id: DeviceInternalId) -> Self {
        Self {
            item_id,
            item_type: DEVICE_ITEM_TYPE,
        }
    }
}

/// Body of `updateTaskJobDynamicFields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFieldUpdate {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    #[serde(rename = "dynamicFieldIDsAndValues")]
    pub values: Vec<DynamicFieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFieldValue {
    #[serde(rename = "dynamicFieldID")]
    pub field_id: i64,
    pub value: String,
}

impl DynamicFieldUpdate {
    pub fn single(job_id: JobId, field_id: i64, value: &str) -> Self {
        Self {
            job_id,
            values: vec![DynamicFieldValue {
                field_id,
                value: value.to_string(),
            }],
        }
    }
}
