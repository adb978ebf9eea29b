//! Lock API tests over an in-memory SQLite engine

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use warden_common::ManualClock;
use warden_core::LockPickConfig;
use warden_core::ShutdownSignal;
use warden_persistence::DatabaseOptions;
use warden_persistence::sea_orm::{ConnectionTrait, Statement};
use warden_server::api;
use warden_server::startup::{self, Engine, EngineOptions, ShutdownReason};

const START: i64 = 1_700_000_000_000;

async fn engine(clock: Arc<ManualClock>) -> Engine {
    let options = EngineOptions {
        database: DatabaseOptions::new("sqlite::memory:"),
        lock_pick: LockPickConfig {
            watch_poll_interval: Duration::from_millis(20),
            watch_max_wait: Duration::from_millis(500),
        },
        sweep_interval: Duration::from_secs(5),
        report_interval: Duration::from_secs(60),
    };
    Engine::start_with_clock(options, clock).await.unwrap()
}

macro_rules! app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($engine.handler()))
                .configure(api::routes),
        )
        .await
    };
}

fn acquire_body(key: &str, owner: &str, ttl_ms: i64) -> Value {
    json!({ "key": key, "owner": owner, "ttl_ms": ttl_ms })
}

#[actix_web::test]
async fn test_acquire_conflict_release_flow() {
    let clock = Arc::new(ManualClock::new(START));
    let engine = engine(clock.clone()).await;
    let app = app!(engine);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(json!({
            "key": "job-17",
            "owner": "worker-A",
            "value": "cGF5bG9hZA==",
            "ttl_ms": 10000
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["owner"], "worker-A");
    assert_eq!(body["data"]["modification_index"], 1);
    assert_eq!(body["data"]["value"], "cGF5bG9hZA==");
    assert_eq!(body["data"]["deadline_ms"], START + 10_000);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-B", 10_000))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "already_held");
    assert_eq!(body["code"], 24000);
    assert_eq!(body["owner"], "worker-A");
    assert_eq!(body["modification_index"], 1);

    let req = test::TestRequest::post()
        .uri("/v1/locks/release")
        .set_json(json!({ "key": "job-17", "owner": "worker-B" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/v1/locks/release")
        .set_json(json!({ "key": "job-17", "owner": "worker-A" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-B", 10_000))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["owner"], "worker-B");
    assert_eq!(body["data"]["modification_index"], 2);
}

#[actix_web::test]
async fn test_rejects_bad_requests() {
    let engine = engine(Arc::new(ManualClock::new(START))).await;
    let app = app!(engine);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-A", 0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_ttl");

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("", "worker-A", 1000))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_input");

    // values must fit the store's value column
    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(json!({
            "key": "job-17",
            "owner": "worker-A",
            "value": STANDARD.encode(vec![0u8; 65_536]),
            "ttl_ms": 1000
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(json!({
            "key": "job-17",
            "owner": "worker-A",
            "value": STANDARD.encode(vec![0u8; 65_535]),
            "ttl_ms": 1000
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_fetch_and_expiry() {
    let clock = Arc::new(ManualClock::new(START));
    let engine = engine(clock.clone()).await;
    let app = app!(engine);

    let req = test::TestRequest::get().uri("/v1/locks/jobs/17").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(json!({
            "key": "jobs/17",
            "owner": "worker-A",
            "kind": "presence",
            "ttl_ms": 1000
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/v1/locks/jobs/17").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["kind"], "presence");

    let req = test::TestRequest::get()
        .uri("/v1/locks/jobs/17?kind=lock")
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::get().uri("/v1/locks?kind=presence").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    clock.advance(Duration::from_millis(1001));

    let req = test::TestRequest::get().uri("/v1/locks/jobs/17").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
    let req = test::TestRequest::get().uri("/v1/locks").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], json!([]));
}

#[actix_web::test]
async fn test_renew_requires_holder() {
    let engine = engine(Arc::new(ManualClock::new(START))).await;
    let app = app!(engine);

    let req = test::TestRequest::post()
        .uri("/v1/locks/renew")
        .set_json(acquire_body("job-17", "worker-A", 1000))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-A", 1000))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/v1/locks/renew")
        .set_json(acquire_body("job-17", "worker-B", 1000))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::post()
        .uri("/v1/locks/renew")
        .set_json(acquire_body("job-17", "worker-A", 5000))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["deadline_ms"], START + 5000);
    assert_eq!(body["data"]["modification_index"], 2);
}

#[actix_web::test]
async fn test_watch() {
    let engine = engine(Arc::new(ManualClock::new(START))).await;
    let app = app!(engine);

    // Caller believes the key is absent and it is: waits out the timeout.
    let req = test::TestRequest::get()
        .uri("/v1/locks/job-17/watch?wait_ms=30")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["record"], Value::Null);

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-A", 10_000))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    // Stale view returns at once.
    let req = test::TestRequest::get()
        .uri("/v1/locks/job-17/watch?wait_ms=10000")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["record"]["owner"], "worker-A");
    assert_eq!(body["data"]["record"]["modification_index"], 1);

    let req = test::TestRequest::get()
        .uri("/v1/locks/job-17/watch?index=1&wait_ms=30")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["record"]["modification_index"], 1);
}

#[actix_web::test]
async fn test_health() {
    let engine = engine(Arc::new(ManualClock::new(START))).await;
    let app = app!(engine);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], "UP");
}

#[actix_web::test]
async fn test_lost_schema_raises_fatal() {
    let engine = engine(Arc::new(ManualClock::new(START))).await;
    let app = app!(engine);

    let store = engine.store();
    let backend = store.db().get_database_backend();
    store
        .db()
        .execute(Statement::from_string(backend, "DROP TABLE locks"))
        .await
        .unwrap();
    assert!(!engine.fatal().is_raised());

    let req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(acquire_body("job-17", "worker-A", 10_000))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "store_fatal");
    assert!(engine.fatal().is_raised());

    // the server loop stops with a failing exit code
    let shutdown = ShutdownSignal::new();
    let reason = tokio::time::timeout(
        Duration::from_secs(1),
        startup::wait_for_stop(shutdown.subscribe(), &engine.fatal()),
    )
    .await
    .unwrap();
    assert!(matches!(reason, ShutdownReason::Fatal(_)));
    assert_eq!(reason.exit_code(), 1);
}
