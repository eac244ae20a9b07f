//! Drives one upgrade run from login to the dynamic-field rebind.
//!
//! Stages run strictly in order and the first fatal failure ends the run.
//! Device lookups are the only stage that tolerates partial failure, and even
//! there an empty result is fatal before any job operation is attempted.

use std::path::PathBuf;

use tracing::{error, info};

use super::dynamic_fields::update_field;
use super::error::{Result, UpgradeError};
use super::membership::set_membership;
use super::models::{ArtifactId, JobId};
use super::remote::BackboxApi;
use super::resolver::{resolve_devices, resolve_job};
use super::session::login;
use super::upload::upload_artifact;

/// Everything a run needs, already resolved from configuration.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub username: String,
    pub password: String,
    pub job_name: String,
    pub artifact_path: PathBuf,
    /// The configured `JOB_FILE_NAME` exactly as given; the job's dynamic field is set to it.
    pub field_value: String,
    pub field_display_name: String,
    pub field_id_override: Option<String>,
    pub lookup_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Authenticated,
    Uploaded,
    DevicesResolved,
    JobResolved,
    MembershipUpdated,
    FieldUpdated,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Uploaded => "uploaded",
            Self::DevicesResolved => "devices_resolved",
            Self::JobResolved => "job_resolved",
            Self::MembershipUpdated => "membership_updated",
            Self::FieldUpdated => "field_updated",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub artifact_id: ArtifactId,
    pub devices_requested: usize,
    pub devices_resolved: usize,
    pub job_id: JobId,
    pub field_id: i64,
    pub field_value: String,
}

/// A failed run: the error and the last stage that completed before it.
#[derive(Debug)]
pub struct RunFailure {
    pub stage: Stage,
    pub error: UpgradeError,
}

impl RunFailure {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

pub struct Orchestrator<'a> {
    api: &'a dyn BackboxApi,
    plan: RunPlan,
    stage: Stage,
}

impl<'a> Orchestrator<'a> {
    pub fn new(api: &'a dyn BackboxApi, plan: RunPlan) -> Self {
        Self {
            api,
            plan,
            stage: Stage::Init,
        }
    }

    /// Run every stage against `device_ids`, which must already be deduplicated.
    pub async fn run(
        mut self,
        device_ids: &[String],
    ) -> std::result::Result<RunReport, RunFailure> {
        match self.drive(device_ids).await {
            Ok(report) => {
                self.advance(Stage::Done);
                Ok(report)
            }
            Err(error) => {
                error!(
                    stage = %self.stage,
                    exit_code = error.exit_code(),
                    status = ?error.http_status(),
                    error = %error,
                    "Upgrade run failed"
                );
                Err(RunFailure {
                    stage: self.stage,
                    error,
                })
            }
        }
    }

    async fn drive(&mut self, device_ids: &[String]) -> Result<RunReport> {
        let session = login(self.api, &self.plan.username, &self.plan.password).await?;
        self.advance(Stage::Authenticated);

        let artifact_id = upload_artifact(&session, &self.plan.artifact_path).await?;
        self.advance(Stage::Uploaded);

        let resolved = resolve_devices(&session, device_ids, self.plan.lookup_concurrency).await;
        if resolved.is_empty() {
            return Err(UpgradeError::EmptyResolution {
                requested: device_ids.len(),
            });
        }
        let resolved: Vec<_> = resolved.into_iter().collect();
        self.advance(Stage::DevicesResolved);

        let job_id = resolve_job(&session, &self.plan.job_name).await?;
        self.advance(Stage::JobResolved);

        set_membership(&session, job_id, &resolved).await?;
        self.advance(Stage::MembershipUpdated);

        // The field takes the configured file name as written; the upload id is not used here.
        let field_value = self.plan.field_value.clone();
        let field_id = update_field(
            &session,
            job_id,
            &field_value,
            &self.plan.field_display_name,
            self.plan.field_id_override.as_deref(),
        )
        .await?;
        self.advance(Stage::FieldUpdated);

        Ok(RunReport {
            artifact_id,
            devices_requested: device_ids.len(),
            devices_resolved: resolved.len(),
            job_id,
            field_id,
            field_value,
        })
    }

    fn advance(&mut self, next: Stage) {
        info!(from = %self.stage, to = %next, "Stage complete");
        self.stage = next;
    }
}
