#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use forge_webhooks::config::Config;
use forge_webhooks::store::{AppState, Backends};
use forge_webhooks::webhook::queue::{self, PoolOptions};

/// In-memory `AppState` with test defaults. Private hosts are allowed so
/// hooks can target local mock servers.
pub fn test_state() -> AppState {
    test_state_with(Config::for_tests())
}

pub fn test_state_with(config: Config) -> AppState {
    AppState::new(config, Backends::memory()).expect("test state")
}

/// Build the full API router with the given state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(forge_webhooks::api::router())
        .with_state(state)
}

/// Running delivery workers. Dropping without `stop` leaves them running
/// until the runtime ends.
pub struct Workers {
    shutdown: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl Workers {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("workers did not stop")
            .expect("workers panicked");
    }
}

/// Start the queue worker pool against `state`.
pub fn start_workers(state: &AppState) -> Workers {
    let (shutdown, rx) = watch::channel(());
    let handle = tokio::spawn(queue::run(
        state.queue.clone(),
        Arc::clone(&state.service),
        PoolOptions {
            workers: state.config.queue_workers,
            batch: state.config.queue_batch,
        },
        rx,
    ));
    Workers { shutdown, handle }
}

/// Poll `check` until it returns true or five seconds pass.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

/// Send a GET request.
pub async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, json_request("POST", path, &body)).await
}

/// Send a PATCH request with a JSON body.
pub async fn patch_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, json_request("PATCH", path, &body)).await
}

/// Send a POST request without a body.
pub async fn post_empty(app: &Router, path: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send a DELETE request.
pub async fn delete_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

fn json_request(method: &str, path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}
