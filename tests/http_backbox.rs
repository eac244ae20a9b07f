//! The reqwest adapter against a fake BackBox served by axum on a loopback port.
//!
//! The fake only answers API calls that carry the session cookie issued by a
//! successful `j_security_check`, so these tests also cover the cookie store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use backbox_upgrade::adapters::{HttpBackbox, HttpSettings};
use backbox_upgrade::core::{Orchestrator, RunPlan, UpgradeError};
use reqwest::Url;
use serde_json::{Value, json};
use tempfile::tempdir;

const SESSION_COOKIE: &str = "JSESSIONID=authenticated";
const JOB_RECORD: &str = r#"{"backup_JOB_ID":55,"name":"Nightly-Upgrade","itemsIN_BackupJob":[{"itemId":9,"itemType":0}],"retries":2,"owner":{"id":4,"name":"ops"}}"#;

#[derive(Default)]
struct Recorded {
    uploads: Vec<(String, usize)>,
    job_updates: Vec<String>,
    discovery_bodies: Vec<String>,
    field_updates: Vec<(Value, Option<String>)>,
    job_list_calls: usize,
}

#[derive(Clone, Default)]
struct Fake {
    recorded: Arc<Mutex<Recorded>>,
}

fn authenticated(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(SESSION_COOKIE))
}

fn json_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn landing() -> Response {
    ([(header::SET_COOKIE, "JSESSIONID=anonymous; Path=/")], "BackBox").into_response()
}

async fn security_check(Form(form): Form<HashMap<String, String>>) -> Response {
    let user_ok = form.get("j_username").map(String::as_str) == Some("admin");
    let pass_ok = form.get("j_password").map(String::as_str) == Some("0000");
    if user_ok && pass_ok {
        let cookie = format!("{SESSION_COOKIE}; Path=/");
        ([(header::SET_COOKIE, cookie)], "").into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response()
    }
}

async fn upload(
    State(fake): State<Fake>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        fake.recorded.lock().unwrap().uploads.push((name, bytes.len()));
        return json_response(json!({"id": "art-981"}).to_string());
    }
    (StatusCode::BAD_REQUEST, "no file part").into_response()
}

async fn device(headers: HeaderMap, Path(external_id): Path<String>) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let body = match external_id.as_str() {
        "D1" => json!([{"deviceId": 301, "externalId": "D1"}]),
        "D3" => json!([{"deviceId": 303, "externalId": "D3"}]),
        "rack 4/sw" => json!([{"deviceId": 304}]),
        "BROKEN" => return (StatusCode::INTERNAL_SERVER_ERROR, "lookup exploded").into_response(),
        _ => json!([]),
    };
    json_response(body.to_string())
}

async fn jobs(State(fake): State<Fake>, headers: HeaderMap) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    fake.recorded.lock().unwrap().job_list_calls += 1;
    json_response(
        json!([
            {"name": "Weekly-Backup", "backup_JOB_ID": 12},
            {"name": "Nightly-Upgrade", "backup_JOB_ID": 55}
        ])
        .to_string(),
    )
}

async fn job(headers: HeaderMap, Path(job_id): Path<i64>) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match job_id {
        55 => json_response(JOB_RECORD.to_string()),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_job(State(fake): State<Fake>, headers: HeaderMap, body: String) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    fake.recorded.lock().unwrap().job_updates.push(body);
    StatusCode::OK.into_response()
}

async fn discover(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
    body: String,
) -> Response {
    if !authenticated(&headers) || job_id != 55 {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    fake.recorded.lock().unwrap().discovery_bodies.push(body);
    json_response(
        json!([
            {"uiName": "Target Version", "dynamicFieldID": 6, "typeId": 1},
            {"uiName": "IOS bin File", "dynamicFieldID": 7, "typeId": 3, "mandatory": true}
        ])
        .to_string(),
    )
}

async fn update_field(State(fake): State<Fake>, headers: HeaderMap, body: String) -> Response {
    if !authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let field_id = payload["dynamicFieldIDsAndValues"][0]["dynamicFieldID"].as_i64();
    fake.recorded.lock().unwrap().field_updates.push((payload, accept));

    // This service version keys fields by their type id.
    match field_id {
        Some(3) => StatusCode::OK.into_response(),
        _ => (StatusCode::BAD_REQUEST, "Unknown dynamic field").into_response(),
    }
}

async fn serve(fake: Fake) -> SocketAddr {
    let app = Router::new()
        .route("/", get(landing))
        .route("/j_security_check", post(security_check))
        .route("/rest/data/taskfile/0", post(upload))
        .route("/rest/data/api/devicesbyExternalId/{id}", get(device))
        .route("/rest/data/api/taskJobs", get(jobs))
        .route("/rest/data/api/taskJob/", put(update_job))
        .route("/rest/data/api/taskJob/{id}", get(job))
        .route("/rest/data/tasks/jobs/getTaskJobDynamicFields/{id}", put(discover))
        .route("/rest/data/tasks/jobs/updateTaskJobDynamicFields", put(update_field))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> HttpBackbox {
    HttpBackbox::new(HttpSettings {
        base_url: Url::parse(&format!("http://{addr}")).unwrap(),
        verify_tls: true,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn plan(artifact: std::path::PathBuf, password: &str) -> RunPlan {
    RunPlan {
        username: "admin".into(),
        password: password.into(),
        job_name: "Nightly-Upgrade".into(),
        field_value: artifact.display().to_string(),
        artifact_path: artifact,
        field_display_name: "IOS bin File".into(),
        field_id_override: None,
        lookup_concurrency: 4,
    }
}

#[tokio::test]
async fn full_run_over_http() {
    let fake = Fake::default();
    let addr = serve(fake.clone()).await;
    let backbox = client(addr);

    let temp = tempdir().unwrap();
    let images = temp.path().join("images");
    std::fs::create_dir(&images).unwrap();
    let artifact = images.join("c2960.bin");
    std::fs::write(&artifact, vec![7u8; 2048]).unwrap();
    let configured = artifact.display().to_string();

    let devices: Vec<String> = ["BROKEN", "D1", "D2", "D3", "rack 4/sw"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let report = Orchestrator::new(&backbox, plan(artifact, "0000"))
        .run(&devices)
        .await
        .expect("run should succeed");

    assert_eq!(report.artifact_id.0, "art-981");
    assert_eq!(report.devices_resolved, 3);
    assert_eq!(report.job_id, 55);
    assert_eq!(report.field_id, 3);

    let recorded = fake.recorded.lock().unwrap();
    assert_eq!(recorded.uploads, vec![("c2960.bin".to_string(), 2048)]);
    assert_eq!(recorded.job_list_calls, 1);

    assert_eq!(
        recorded.job_updates,
        vec![
            r#"{"backup_JOB_ID":55,"name":"Nightly-Upgrade","itemsIN_BackupJob":[{"itemId":301,"itemType":0},{"itemId":303,"itemType":0},{"itemId":304,"itemType":0}],"retries":2,"owner":{"id":4,"name":"ops"}}"#
                .to_string()
        ]
    );

    assert_eq!(recorded.discovery_bodies, vec!["[]".to_string()]);

    let attempted: Vec<i64> = recorded
        .field_updates
        .iter()
        .filter_map(|(payload, _)| {
            payload["dynamicFieldIDsAndValues"][0]["dynamicFieldID"].as_i64()
        })
        .collect();
    assert_eq!(attempted, vec![7, 3]);

    let (last_payload, accept) = recorded.field_updates.last().unwrap();
    assert_eq!(last_payload["jobID"], 55);
    assert_eq!(
        last_payload["dynamicFieldIDsAndValues"][0]["value"],
        configured.as_str()
    );
    assert_eq!(accept.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn bad_credentials_stop_at_login() {
    let fake = Fake::default();
    let addr = serve(fake.clone()).await;
    let backbox = client(addr);

    let temp = tempdir().unwrap();
    let artifact = temp.path().join("c2960.bin");
    std::fs::write(&artifact, b"image").unwrap();

    let failure = Orchestrator::new(&backbox, plan(artifact, "wrong"))
        .run(&["D1".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UpgradeError::Auth(_)));
    assert_eq!(failure.error.http_status(), Some(401));
    assert!(fake.recorded.lock().unwrap().uploads.is_empty());
}

#[tokio::test]
async fn unreachable_service_is_an_auth_failure() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backbox = client(addr);
    let temp = tempdir().unwrap();
    let artifact = temp.path().join("c2960.bin");
    std::fs::write(&artifact, b"image").unwrap();

    let failure = Orchestrator::new(&backbox, plan(artifact, "0000"))
        .run(&["D1".to_string()])
        .await
        .unwrap_err();

    assert_eq!(failure.exit_code(), 3);
    assert_eq!(failure.error.http_status(), None);
}
