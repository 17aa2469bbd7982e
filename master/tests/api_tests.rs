//! API round-trips over the in-process store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use common::constants::keys;
use common::logstore::LogStore;
use common::records::LogRecord;
use common::store::{KvStore, MemoryStore};
use master::api::{router, AppState};
use master::jobs::JobManager;
use master::workers::WorkerRegistry;

struct TestApi {
    app: Router,
    store: Arc<dyn KvStore>,
    logs: LogStore,
    _dir: TempDir,
}

async fn test_api() -> TestApi {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs.db");
    let logs = LogStore::connect(path.to_str().unwrap()).await.unwrap();

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState {
        jobs: JobManager::new(store.clone()),
        workers: WorkerRegistry::new(store.clone()),
        logs: logs.clone(),
    });

    TestApi {
        app: router(state),
        store,
        logs,
        _dir: dir,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Value {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn job_body(name: &str, expr: &str) -> Value {
    json!({"name": name, "command": "echo hi", "cronExpr": expr})
}

#[tokio::test]
async fn save_returns_the_previous_definition() {
    let api = test_api().await;

    let first = call(&api.app, "POST", "/job/save", Some(job_body("job1", "* * * * *"))).await;
    assert_eq!(first["success"], json!(true));
    assert_eq!(first["data"], Value::Null, "no previous definition");

    let second =
        call(&api.app, "POST", "/job/save", Some(job_body("job1", "*/5 * * * *"))).await;
    assert_eq!(second["success"], json!(true));
    assert_eq!(second["data"]["cronExpr"], json!("* * * * *"));
}

#[tokio::test]
async fn save_rejects_bad_cron_expressions() {
    let api = test_api().await;

    let response = call(
        &api.app,
        "POST",
        "/job/save",
        Some(job_body("job1", "not a schedule")),
    )
    .await;
    assert_eq!(response["success"], json!(false));
    assert!(response["error"].as_str().unwrap().contains("not a schedule"));

    // nothing was written
    let (kvs, _) = api.store.get_prefix(keys::JOBS_PREFIX).await.unwrap();
    assert!(kvs.is_empty());
}

#[tokio::test]
async fn list_and_delete_round_trip() {
    let api = test_api().await;

    call(&api.app, "POST", "/job/save", Some(job_body("job-a", "* * * * *"))).await;
    call(&api.app, "POST", "/job/save", Some(job_body("job-b", "* * * * *"))).await;

    let listed = call(&api.app, "GET", "/job/list", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);

    let deleted = call(&api.app, "POST", "/job/delete", Some(json!({"name": "job-a"}))).await;
    assert_eq!(deleted["data"]["name"], json!("job-a"));

    let listed = call(&api.app, "GET", "/job/list", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    // deleting a missing job succeeds with no data
    let missing = call(&api.app, "POST", "/job/delete", Some(json!({"name": "job-a"}))).await;
    assert_eq!(missing["success"], json!(true));
    assert_eq!(missing["data"], Value::Null);
}

#[tokio::test]
async fn kill_writes_a_self_expiring_marker() {
    let api = test_api().await;

    let response = call(&api.app, "POST", "/job/kill", Some(json!({"name": "job1"}))).await;
    assert_eq!(response["success"], json!(true));

    let (markers, _) = api.store.get_prefix(keys::KILL_PREFIX).await.unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].key, keys::kill_key("job1"));

    // the marker's lease lapses on its own
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (markers, _) = api.store.get_prefix(keys::KILL_PREFIX).await.unwrap();
    assert!(markers.is_empty(), "kill marker should have expired");
}

#[tokio::test]
async fn worker_list_reflects_registrations() {
    let api = test_api().await;

    let empty = call(&api.app, "GET", "/worker/list", None).await;
    assert_eq!(empty["data"], json!([]));

    api.store
        .put(&keys::worker_key("worker-1"), "worker-1")
        .await
        .unwrap();

    let listed = call(&api.app, "GET", "/worker/list", None).await;
    assert_eq!(listed["data"], json!(["worker-1"]));
}

#[tokio::test]
async fn log_query_pages_newest_first() {
    let api = test_api().await;

    let records: Vec<LogRecord> = (0..5)
        .map(|i| LogRecord {
            job_name: "job1".to_string(),
            command: "echo hi".to_string(),
            error: String::new(),
            output: "hi\n".to_string(),
            planned_time: i,
            scheduled_time: i,
            start_time: i,
            end_time: i + 1,
        })
        .collect();
    api.logs.insert_batch(&records).await.unwrap();

    let page = call(&api.app, "GET", "/job/log?name=job1&skip=1&limit=2", None).await;
    let data = page["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["startTime"], json!(3));
    assert_eq!(data[1]["startTime"], json!(2));
}
