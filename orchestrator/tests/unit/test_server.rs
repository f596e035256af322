//! Control API tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use rollout::server::serve::router;
use rollout::server::state::ServerState;

use crate::support::fixture;

fn app() -> Router {
    router(Arc::new(ServerState::new(fixture().service)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_environment(app: &Router) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/environments",
        Some(json!({
            "tenant_id": uuid::Uuid::new_v4(),
            "name": "production",
            "server_host": "db.prod.local",
            "config": {"region": "eu-west"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_version() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_installation_lifecycle() {
    let app = app();
    let environment_id = create_environment(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/installations",
        Some(json!({"environment_id": environment_id, "product_version": "7.0.1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    let id = body["id"].as_str().unwrap().to_string();

    for (n, name) in ["backup", "migrate"].iter().enumerate() {
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/installations/{}/tasks", id),
            Some(json!({"name": name, "script_ref": format!("scripts/{}.sh", name)})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["order"], n as u64 + 1);
    }

    let (status, body) = call(&app, Method::POST, &format!("/installations/{}/start", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["tasks"].as_array().unwrap().len(), 2);

    // a second start is a rule violation
    let (status, body) = call(&app, Method::POST, &format!("/installations/{}/start", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "business_rule_violation");

    let (status, body) = call(&app, Method::POST, &format!("/installations/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["tasks"][0]["status"], "skipped");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/environments/{}/installations", environment_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["installations"][0]["status"], "cancelled");
}

#[tokio::test]
async fn test_start_without_tasks_conflicts() {
    let app = app();
    let environment_id = create_environment(&app).await;
    let (_, body) = call(
        &app,
        Method::POST,
        "/installations",
        Some(json!({"environment_id": environment_id, "product_version": "7.0.1"})),
    )
    .await;
    let id = body["id"].as_str().unwrap();

    let (status, body) = call(&app, Method::POST, &format!("/installations/{}/start", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "business_rule_violation");
}

#[tokio::test]
async fn test_error_mapping() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/installations/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, body) = call(&app, Method::GET, "/installations/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");

    let (status, body) = call(
        &app,
        Method::POST,
        "/installations",
        Some(json!({"environment_id": uuid::Uuid::new_v4(), "product_version": "1.0"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let environment_id = create_environment(&app).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/installations",
        Some(json!({"environment_id": environment_id, "product_version": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_get_environment() {
    let app = app();
    let environment_id = create_environment(&app).await;

    let (status, body) = call(&app, Method::GET, &format!("/environments/{}", environment_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "production");
    assert_eq!(body["config"]["region"], "eu-west");
    assert!(body["installation_ids"].as_array().unwrap().is_empty());
}
