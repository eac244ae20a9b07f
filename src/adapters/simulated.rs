use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::models::JobId;
use crate::core::remote::{ApiResult, BackboxApi, HttpReply};

/// A request the simulator received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Login { username: String },
    Upload { file_name: String, size: usize },
    LookupDevice { external_id: String },
    ListJobs,
    FetchJob { job_id: JobId },
    UpdateJob { record: Value },
    GetDynamicFields { job_id: JobId },
    UpdateDynamicFields { payload: Value },
}

/// In-memory BackBox used by tests and by `--simulation` dry runs.
///
/// Unknown devices answer with an empty list, unknown jobs with 404. Dynamic
/// field updates are accepted only for the ids registered with
/// [`SimulatedBackbox::accepting_field_ids`]; everything else gets a 400.
#[derive(Clone, Default)]
pub struct SimulatedBackbox {
    credentials: Option<(String, String)>,
    login_reply: Option<HttpReply>,
    upload_reply: Option<HttpReply>,
    devices: HashMap<String, HttpReply>,
    jobs: Vec<(String, JobId)>,
    jobs_reply: Option<HttpReply>,
    job_records: HashMap<JobId, HttpReply>,
    update_job_reply: Option<HttpReply>,
    dynamic_fields: HashMap<JobId, HttpReply>,
    accepted_field_ids: BTreeSet<i64>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl SimulatedBackbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a simulator that will accept a full run for the given job, devices and field.
    pub fn seeded(job_name: &str, field_display_name: &str, external_ids: &[String]) -> Self {
        const JOB_ID: JobId = 1;
        const FIELD_ID: i64 = 1;

        let mut sim = Self::new()
            .with_job(
                job_name,
                JOB_ID,
                json!({"backup_JOB_ID": JOB_ID, "name": job_name, "itemsIN_BackupJob": []}),
            )
            .with_dynamic_fields(
                JOB_ID,
                json!([{"uiName": field_display_name, "dynamicFieldID": FIELD_ID}]),
            )
            .accepting_field_ids([FIELD_ID]);

        for (n, external_id) in external_ids.iter().enumerate() {
            sim = sim.with_device(external_id, 1000 + n as i64);
        }
        sim
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_login_reply(mut self, reply: HttpReply) -> Self {
        self.login_reply = Some(reply);
        self
    }

    pub fn with_upload_reply(mut self, reply: HttpReply) -> Self {
        self.upload_reply = Some(reply);
        self
    }

    pub fn with_device(self, external_id: &str, device_id: i64) -> Self {
        let body = json!([{"deviceId": device_id, "externalId": external_id}]);
        self.with_device_reply(external_id, HttpReply::new(200, body.to_string()))
    }

    pub fn with_device_reply(mut self, external_id: &str, reply: HttpReply) -> Self {
        self.devices.insert(external_id.to_string(), reply);
        self
    }

    /// Register a job in the listing and serve `record` for it.
    pub fn with_job(mut self, name: &str, job_id: JobId, record: Value) -> Self {
        self.jobs.push((name.to_string(), job_id));
        self.with_job_reply(job_id, HttpReply::new(200, record.to_string()))
    }

    pub fn with_jobs_reply(mut self, reply: HttpReply) -> Self {
        self.jobs_reply = Some(reply);
        self
    }

    pub fn with_job_reply(mut self, job_id: JobId, reply: HttpReply) -> Self {
        self.job_records.insert(job_id, reply);
        self
    }

    pub fn with_update_job_reply(mut self, reply: HttpReply) -> Self {
        self.update_job_reply = Some(reply);
        self
    }

    pub fn with_dynamic_fields(self, job_id: JobId, descriptors: Value) -> Self {
        self.with_dynamic_fields_reply(job_id, HttpReply::new(200, descriptors.to_string()))
    }

    pub fn with_dynamic_fields_reply(mut self, job_id: JobId, reply: HttpReply) -> Self {
        self.dynamic_fields.insert(job_id, reply);
        self
    }

    pub fn accepting_field_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.accepted_field_ids = ids.into_iter().collect();
        self
    }

    /// Snapshot of every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn listing(&self) -> HttpReply {
        if let Some(reply) = &self.jobs_reply {
            return reply.clone();
        }
        let jobs: Vec<Value> = self
            .jobs
            .iter()
            .map(|(name, id)| json!({"name": name, "backup_JOB_ID": id}))
            .collect();
        HttpReply::new(200, Value::Array(jobs).to_string())
    }
}

fn not_found() -> HttpReply {
    HttpReply::new(404, "Not Found")
}

#[async_trait]
impl BackboxApi for SimulatedBackbox {
    async fn login(&self, username: &str, password: &str) -> ApiResult {
        self.record(Call::Login {
            username: username.to_string(),
        });
        if let Some(reply) = &self.login_reply {
            return Ok(reply.clone());
        }
        let accepted = match &self.credentials {
            Some((user, pass)) => user == username && pass == password,
            None => true,
        };
        Ok(if accepted {
            HttpReply::new(200, "")
        } else {
            HttpReply::new(401, "Invalid username or password")
        })
    }

    async fn upload_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult {
        self.record(Call::Upload {
            file_name: file_name.to_string(),
            size: contents.len(),
        });
        Ok(self.upload_reply.clone().unwrap_or_else(|| {
            HttpReply::new(200, json!({"id": format!("sim-{file_name}")}).to_string())
        }))
    }

    async fn lookup_device(&self, external_id: &str) -> ApiResult {
        self.record(Call::LookupDevice {
            external_id: external_id.to_string(),
        });
        Ok(self
            .devices
            .get(external_id)
            .cloned()
            .unwrap_or_else(|| HttpReply::new(200, "[]")))
    }

    async fn list_jobs(&self) -> ApiResult {
        self.record(Call::ListJobs);
        Ok(self.listing())
    }

    async fn fetch_job(&self, job_id: JobId) -> ApiResult {
        self.record(Call::FetchJob { job_id });
        Ok(self.job_records.get(&job_id).cloned().unwrap_or_else(not_found))
    }

    async fn update_job(&self, record: &Value) -> ApiResult {
        self.record(Call::UpdateJob {
            record: record.clone(),
        });
        Ok(self
            .update_job_reply
            .clone()
            .unwrap_or_else(|| HttpReply::new(200, "")))
    }

    async fn get_dynamic_fields(&self, job_id: JobId) -> ApiResult {
        self.record(Call::GetDynamicFields { job_id });
        Ok(self
            .dynamic_fields
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| HttpReply::new(200, "[]")))
    }

    async fn update_dynamic_fields(&self, payload: &Value) -> ApiResult {
        self.record(Call::UpdateDynamicFields {
            payload: payload.clone(),
        });
        let field_id = payload["dynamicFieldIDsAndValues"][0]["dynamicFieldID"].as_i64();
        Ok(match field_id {
            Some(id) if self.accepted_field_ids.contains(&id) => HttpReply::new(200, ""),
            _ => HttpReply::new(400, "Invalid dynamic field id"),
        })
    }
}
