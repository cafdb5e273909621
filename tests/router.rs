mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use common::{brazil_evaluation, console_with, FakeBackend};
use hinteval_console::cache::MemoryStore;
use hinteval_console::routes::build_router;

async fn call(app: axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let req = Request::builder().method(method).uri(uri).header("content-type", "application/json");
  let req = match body {
    Some(v) => req.body(Body::from(v.to_string())).unwrap(),
    None => req.body(Body::empty()).unwrap(),
  };
  let res = app.oneshot(req).await.unwrap();
  let status = res.status();
  let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
  (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_reports_phase() {
  let console = Arc::new(console_with(Arc::new(FakeBackend::with_session("Q", "")), Arc::new(MemoryStore::default())));
  let (status, body) = call(build_router(console.clone()), Method::GET, "/api/v1/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["phase"], "uninitialized");

  console.reconcile().await.unwrap();
  let (_, body) = call(build_router(console), Method::GET, "/api/v1/health", None).await;
  assert_eq!(body["phase"], "ready");
  assert_eq!(body["busy"], false);
}

#[tokio::test]
async fn presets_are_listed() {
  let console = Arc::new(console_with(Arc::new(FakeBackend::default()), Arc::new(MemoryStore::default())));
  let (status, body) = call(build_router(console), Method::GET, "/api/v1/presets", None).await;
  assert_eq!(status, StatusCode::OK);
  let list = body.as_array().unwrap();
  assert_eq!(list.len(), hinteval_console::seeds::presets().len());
  assert_eq!(list[0]["key"], "What is the capital of Brazil?");
}

#[tokio::test]
async fn errors_carry_status_and_message() {
  let console = Arc::new(console_with(Arc::new(FakeBackend::with_session("", "")), Arc::new(MemoryStore::default())));
  console.reconcile().await.unwrap();

  let (status, body) =
    call(build_router(console.clone()), Method::POST, "/api/v1/hints/add", Some(serde_json::json!({"text": "x"}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("no active question"));

  let (status, _) =
    call(build_router(console), Method::POST, "/api/v1/hints/delete", Some(serde_json::json!({"id": 42}))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snapshot_exposes_hint_views() {
  let backend = Arc::new(FakeBackend::with_session("What is the capital of Brazil?", "Brasília"));
  backend.set_hints(&[(5, "A planned city")]);
  let console = Arc::new(console_with(backend, Arc::new(MemoryStore::default())));
  console.reconcile().await.unwrap();

  let (status, body) = call(build_router(console), Method::GET, "/api/v1/snapshot", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["question"], "What is the capital of Brazil?");
  assert_eq!(body["hints"][0]["id"], 5);
  assert_eq!(body["hints"][0]["evaluated"], false);
  assert!(body["hints"][0]["color"].as_str().unwrap().starts_with('#'));
}

#[tokio::test]
async fn snapshot_reports_busy_and_edits_conflict_during_evaluation() {
  let backend = Arc::new(FakeBackend::with_session("What is the capital of Brazil?", "Brasília"));
  backend.set_hints(&[(1, "A planned city"), (2, "Far from the coast")]);
  backend.state.lock().unwrap().evaluation = brazil_evaluation();
  *backend.delay.lock().unwrap() = Some(Duration::from_millis(200));
  let console = Arc::new(console_with(backend.clone(), Arc::new(MemoryStore::default())));
  console.reconcile().await.unwrap();

  let running = {
    let console = console.clone();
    tokio::spawn(async move { console.evaluate().await })
  };
  tokio::time::sleep(Duration::from_millis(30)).await;

  let (_, body) = call(build_router(console.clone()), Method::GET, "/api/v1/snapshot", None).await;
  assert_eq!(body["busy"], true);
  assert_eq!(body["phase"], "ready");
  assert_eq!(body["hints"].as_array().unwrap().len(), 2);

  let (status, _) =
    call(build_router(console.clone()), Method::POST, "/api/v1/hints/add", Some(serde_json::json!({"text": "x"}))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(backend.calls("create_hint"), 0);

  running.await.unwrap().unwrap();
  let (_, body) = call(build_router(console), Method::GET, "/api/v1/snapshot", None).await;
  assert_eq!(body["busy"], false);
  assert_eq!(body["hints"][0]["id"], 2);
  assert_eq!(body["hints"][0]["evaluated"], true);
}

#[tokio::test]
async fn entities_are_served_per_hint() {
  let backend = Arc::new(FakeBackend::with_session("Q", ""));
  backend.set_hints(&[(3, "Rome was not built in a day")]);
  backend.state.lock().unwrap().entities = [(
    hinteval_console::domain::HintId(3),
    vec![hinteval_console::domain::Entity {
      text: "Rome".into(),
      kind: "GPE".into(),
      start: 0,
      end: 4,
      metadata: Value::Null,
    }],
  )]
  .into_iter()
  .collect();
  let console = Arc::new(console_with(backend, Arc::new(MemoryStore::default())));
  console.reconcile().await.unwrap();

  let (status, body) = call(build_router(console), Method::GET, "/api/v1/entities", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["3"][0]["text"], "Rome");
  assert_eq!(body["3"][0]["type"], "GPE");
}
