//! End-to-end REST surface tests, exercising the router the way a real
//! client would rather than calling `MultiQueue` directly.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use multiqueue_service::auth::TokenProvider;
use multiqueue_service::config::{
    AuthenticationMode, BackendKind, DatabaseConfig, DocumentConfig, RedisConfig, ServerConfig,
    Settings, TokenConfig,
};
use multiqueue_service::domain::core::MultiQueue;
use multiqueue_service::domain::queue::MemoryBackend;
use multiqueue_service::domain::restriction::MemoryRestrictionBackend;
use multiqueue_service::server::{create_app, AccessControl, AppState};

fn settings(mode: AuthenticationMode, secret: Option<&str>) -> Settings {
    Settings {
        backend_kind: BackendKind::Memory,
        authentication_mode: mode,
        token: TokenConfig {
            secret: secret.map(str::to_string),
            default_ttl_seconds: 3600,
        },
        admin_token: Some("admin-secret".to_string()),
        database: DatabaseConfig::default(),
        redis: RedisConfig::default(),
        document: DocumentConfig::default(),
        server: ServerConfig::default(),
    }
}

fn build_app(mode: AuthenticationMode, secret: Option<&str>) -> (axum::Router, Arc<TokenProvider>) {
    let settings = Arc::new(settings(mode, secret));
    let queue = Arc::new(MultiQueue::new(Arc::new(MemoryBackend::new())));
    let restriction = Arc::new(MemoryRestrictionBackend::new());
    let token_provider = Arc::new(TokenProvider::new(&settings.token));
    let access_control = Arc::new(AccessControl::new(
        mode,
        token_provider.clone(),
        restriction.clone(),
    ));
    let state = AppState::new(
        settings,
        queue,
        restriction,
        access_control,
        token_provider.clone(),
        BackendKind::Memory,
    );
    (create_app(state), token_provider)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn bearer(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        "authorization",
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

#[tokio::test]
async fn publish_consume_round_trip() {
    let (app, _) = build_app(AuthenticationMode::None, None);

    let create = post(
        "/message",
        json!({"uuid": "a", "subQueue": "orders", "payload": {"contentType": "text/plain", "data": "x"}}),
    );
    let resp = app.clone().oneshot(create).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let peeked = app.clone().oneshot(get("/queue/orders/peek")).await.unwrap();
    assert_eq!(peeked.status(), StatusCode::OK);
    let peeked_body = body_json(peeked).await;
    assert_eq!(peeked_body["uuid"], "a");

    let polled = app.clone().oneshot(get("/queue/orders/next")).await.unwrap();
    assert_eq!(polled.status(), StatusCode::OK);
    let polled_body = body_json(polled).await;
    assert_eq!(polled_body["uuid"], "a");

    let empty_peek = app.clone().oneshot(get("/queue/orders/peek")).await.unwrap();
    assert_eq!(empty_peek.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn duplicate_uuid_returns_409_referencing_the_existing_sub_queue() {
    let (app, _) = build_app(AuthenticationMode::None, None);

    let first = post(
        "/message",
        json!({"uuid": "a", "subQueue": "orders", "payload": {"contentType": "text/plain", "data": "x"}}),
    );
    assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::CREATED);

    let second = post(
        "/message",
        json!({"uuid": "a", "subQueue": "shipping", "payload": {"contentType": "text/plain", "data": "y"}}),
    );
    let resp = app.clone().oneshot(second).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("orders"));
}

#[tokio::test]
async fn assignment_contention_follows_the_idempotent_assign_release_rules() {
    let (app, _) = build_app(AuthenticationMode::None, None);

    let add = post(
        "/message",
        json!({"uuid": "b", "subQueue": "jobs", "payload": {"contentType": "text/plain", "data": "x"}}),
    );
    assert_eq!(app.clone().oneshot(add).await.unwrap().status(), StatusCode::CREATED);

    let assign1 = post("/queue/jobs/assign", json!({"owner": "worker-1"}));
    let resp = app.clone().oneshot(assign1).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let assigned = body_json(resp).await;
    assert_eq!(assigned["assignedTo"], "worker-1");

    let assign2 = post("/queue/jobs/assign", json!({"owner": "worker-2"}));
    let resp = app.clone().oneshot(assign2).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let release_wrong = post("/queue/jobs/release", json!({"owner": "worker-2"}));
    let resp = app.clone().oneshot(release_wrong).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let release_right = post("/queue/jobs/release", json!({"owner": "worker-1"}));
    let resp = app.clone().oneshot(release_right).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let released = body_json(resp).await;
    assert!(released["assignedTo"].is_null());
}

#[tokio::test]
async fn restricted_mode_enforces_the_matching_token_gate() {
    let (app, token_provider) = build_app(AuthenticationMode::Restricted, Some("test-secret"));

    let admin_add_restriction = Request::builder()
        .method("PUT")
        .uri("/restriction/secure")
        .header("authorization", "Bearer admin-secret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(admin_add_restriction).await.unwrap().status(),
        StatusCode::OK
    );

    let no_token = app.clone().oneshot(get("/queue/secure/next")).await.unwrap();
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let wrong_token = token_provider.issue("other", None).unwrap();
    let wrong = app
        .clone()
        .oneshot(bearer(get("/queue/secure/next"), &wrong_token))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let right_token = token_provider.issue("secure", None).unwrap();
    let right = app
        .clone()
        .oneshot(bearer(get("/queue/secure/next"), &right_token))
        .await
        .unwrap();
    assert_eq!(right.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn delete_message_and_owners_reflect_state_across_sub_queues() {
    let (app, _) = build_app(AuthenticationMode::None, None);

    for (uuid, sub_queue) in [("m1", "a"), ("m2", "a"), ("m3", "b"), ("m4", "b"), ("m5", "a")] {
        let req = post(
            "/message",
            json!({"uuid": uuid, "subQueue": sub_queue, "payload": {"contentType": "text/plain", "data": "x"}}),
        );
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::CREATED);
    }

    let a_keys = app.clone().oneshot(get("/queue/a")).await.unwrap();
    let a_records = body_json(a_keys).await;
    assert_eq!(a_records.as_array().unwrap().len(), 3);

    let deleted = app.clone().oneshot(
        Request::builder()
            .method("DELETE")
            .uri("/message/m1")
            .body(Body::empty())
            .unwrap(),
    ).await.unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    let body = body_json(deleted).await;
    assert_eq!(body["removed"], true);

    let owners = app.clone().oneshot(get("/owners")).await.unwrap();
    assert_eq!(owners.status(), StatusCode::OK);
}
