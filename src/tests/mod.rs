//! Dispatch-level tests.
//!
//! These drive [`Application::handle`] in-process, without network I/O. Tests
//! that need a real listener live in `tests/server_tests.rs`.
//!
//! ## Available Helpers
//!
//! - Handle builders: `request()`, `request_with_headers()`
//! - Application builders: `test_app()`
//! - Round trips: `send()`, `send_request()`, `body_string()`
//! - Recording: `Trail` with `trail()` and `record()`

use crate::{Application, Next, Request, Response, handler, Handler};
use axum::body::Body;
use http::{HeaderMap, Method, StatusCode};
use std::sync::{Arc, Mutex};

mod errors;
mod mounting;
mod settings;

// ============================================================================
// Handle Helpers
// ============================================================================

/// Creates a request/response pair for `method` and `uri`.
pub(crate) fn request(method: Method, uri: &str) -> (Request, Response) {
    request_with_headers(method, uri, &[])
}

/// Creates a request/response pair with extra request headers.
pub(crate) fn request_with_headers(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> (Request, Response) {
    let req = Request::from_http(http_request(method, uri, headers));
    let res = Response::new(&req);
    (req, res)
}

fn http_request(method: Method, uri: &str, headers: &[(&str, &str)]) -> http::Request<Body> {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

// ============================================================================
// Application Helpers
// ============================================================================

/// An application with `env` set to `test`, which silences the finalizer's logging.
pub(crate) fn test_app() -> Application {
    let app = Application::new();
    app.set("env", "test").unwrap();
    app
}

/// Result of a full round trip through [`Application::handle`].
pub(crate) struct TestResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
}

impl TestResponse {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub(crate) async fn send(app: &Application, method: Method, uri: &str) -> TestResponse {
    send_request(app, http_request(method, uri, &[])).await
}

pub(crate) async fn send_with_headers(
    app: &Application,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> TestResponse {
    send_request(app, http_request(method, uri, headers)).await
}

pub(crate) async fn send_request(app: &Application, request: http::Request<Body>) -> TestResponse {
    let response = app.handle(request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = body_string(response).await;
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Extracts the body of a response as a String.
pub(crate) async fn body_string(response: http::Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

// ============================================================================
// Recording Handlers
// ============================================================================

/// Names of the handlers that ran, in order.
pub(crate) type Trail = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn trail() -> Trail {
    Arc::new(Mutex::new(Vec::new()))
}

/// A handler that records `name` and returns `next`.
pub(crate) fn record(trail: &Trail, name: &'static str, next: Next) -> Handler {
    let trail = trail.clone();
    handler(move |_req: Request, _res: Response| {
        trail.lock().unwrap().push(name);
        async move { next }
    })
}

/// A handler that records `name` and sends it as the body.
pub(crate) fn respond(trail: &Trail, name: &'static str) -> Handler {
    let trail = trail.clone();
    handler(move |_req: Request, res: Response| {
        trail.lock().unwrap().push(name);
        async move { res.send(name) }
    })
}

pub(crate) fn entries(trail: &Trail) -> Vec<&'static str> {
    trail.lock().unwrap().clone()
}
