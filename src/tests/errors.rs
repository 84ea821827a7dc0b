//! Error propagation, error handlers and the finalizer's error responses.

use super::{entries, record, respond, send, test_app, trail};
use crate::{
    Application, Error, ErrorKind, Next, PANIC_WITHOUT_MESSAGE, Request, Response, Result, Router,
    error_handler, handler,
};
use http::{Method, StatusCode};
use tracing_test::traced_test;

fn fail(msg: &'static str) -> crate::Handler {
    handler(move |_req: Request, _res: Response| async move { Err::<Next, _>(Error::handler(msg)) })
}

fn explode(msg: &str) -> Result<Next> {
    panic!("{msg}")
}

fn explode_without_message() -> Result<Next> {
    std::panic::panic_any(404u16)
}

/// Error handler answering with the error's kind and message.
fn report() -> crate::Handler {
    error_handler(|err: Error, _req: Request, res: Response| async move {
        res.status(StatusCode::INTERNAL_SERVER_ERROR)
            .send(format!("{:?}: {}", err.kind(), err))
    })
}

#[tokio::test]
async fn returned_error_skips_to_error_handler() {
    let app = test_app();
    let t = trail();
    app.use_handlers("/", fail("broken")).unwrap();
    app.use_handlers("/", record(&t, "skipped middleware", Next::Continue))
        .unwrap();
    app.get("/", respond(&t, "skipped route")).unwrap();
    app.use_handlers("/", report()).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "Handler: broken");
    assert!(entries(&t).is_empty());
}

#[tokio::test]
async fn panics_are_dispatched_like_errors() {
    let app = test_app();
    app.get("/sync", handler(|_req: Request, _res: Response| {
        std::future::ready(explode("sync boom"))
    }))
    .unwrap();
    app.get("/async", handler(|_req: Request, _res: Response| async {
        tokio::task::yield_now().await;
        explode("async boom")
    }))
    .unwrap();
    app.use_handlers("/", report()).unwrap();

    assert_eq!(send(&app, Method::GET, "/sync").await.body, "Panic: sync boom");
    assert_eq!(send(&app, Method::GET, "/async").await.body, "Panic: async boom");
}

#[tokio::test]
async fn panic_without_message_uses_fixed_message() {
    let app = test_app();
    app.get("/", handler(|_req: Request, _res: Response| async {
        explode_without_message()
    }))
    .unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["error_code"], "HANDLER_PANIC");
    assert_eq!(res.json()["message"], PANIC_WITHOUT_MESSAGE);
}

#[tokio::test]
async fn error_handlers_are_skipped_without_error() {
    let app = test_app();
    let t = trail();
    app.use_handlers("/", report()).unwrap();
    app.get("/", respond(&t, "ok")).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.body, "ok");
}

#[tokio::test]
async fn error_handler_can_recover_and_continue() {
    let app = test_app();
    let t = trail();
    app.use_handlers("/", fail("first")).unwrap();
    app.error_middleware("/", |_err: Error, _req: Request, _res: Response| async {
        Next::Continue
    })
    .unwrap();
    app.get("/", respond(&t, "recovered")).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.body, "recovered");
}

#[tokio::test]
async fn error_handler_can_replace_the_error() {
    let app = test_app();
    app.use_handlers("/", fail("original")).unwrap();
    app.error_middleware("/", |err: Error, _req: Request, _res: Response| async move {
        Err::<Next, _>(Error::handler(format!("wrapped {err}")))
    })
    .unwrap();
    app.use_handlers("/", report()).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.body, "Handler: wrapped original");
}

#[tokio::test]
async fn route_error_handlers_run_inside_the_route() {
    let app = test_app();
    let t = trail();
    app.get("/r", [fail("in route"), report()]).unwrap();
    app.use_handlers("/", record(&t, "later middleware", Next::Continue))
        .unwrap();

    let res = send(&app, Method::GET, "/r").await;
    assert_eq!(res.body, "Handler: in route");
    assert!(entries(&t).is_empty());
}

#[tokio::test]
async fn errors_escape_mounted_routers() {
    let app = test_app();
    let api = Router::new();
    api.use_handlers("/", fail("nested")).unwrap();
    app.use_handlers("/api", api).unwrap();
    app.use_handlers("/", report()).unwrap();

    let res = send(&app, Method::GET, "/api/x").await;
    assert_eq!(res.body, "Handler: nested");
}

#[tokio::test]
async fn unhandled_error_uses_explicit_status() {
    let app = test_app();
    app.get("/", handler(|_req: Request, _res: Response| async {
        Err::<(), _>(Error::http(StatusCode::FORBIDDEN, "no entry"))
    }))
    .unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.json()["message"], "no entry");
    assert_eq!(res.header("content-security-policy"), Some("default-src 'none'"));
    assert!(res.header("content-type").unwrap().starts_with("application/json"));
}

#[tokio::test]
async fn unhandled_error_defaults_to_500() {
    let app = test_app();
    app.use_handlers("/", fail("kaput")).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["error_code"], "HANDLER_ERROR");
    assert_eq!(res.json()["message"], "kaput");
}

#[tokio::test]
async fn production_hides_error_messages() {
    let app = Application::new();
    app.set("env", "production").unwrap();
    app.use_handlers("/", fail("secret detail")).unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.json()["message"], "Internal Server Error");
}

#[tokio::test]
async fn bad_percent_encoding_is_a_bad_request() {
    let app = test_app();
    let t = trail();
    app.get("/users/:id", respond(&t, "user")).unwrap();

    let res = send(&app, Method::GET, "/users/%E0%A4%A").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["error_code"], "INVALID_INPUT");
    assert!(entries(&t).is_empty());
}

#[tokio::test]
async fn error_after_response_was_sent_keeps_the_response() {
    let app = test_app();
    app.use_handlers("/", handler(|_req: Request, res: Response| async move {
        res.send("partial")?;
        Err::<Next, _>(Error::handler("late failure"))
    }))
    .unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "partial");
}

#[tokio::test]
async fn second_send_is_an_error() {
    let app = test_app();
    app.get("/", handler(|_req: Request, res: Response| async move {
        res.send("one")?;
        res.send("two")
    }))
    .unwrap();
    app.error_middleware("/", |err: Error, _req: Request, _res: Response| async move {
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "Cannot send a response that has already been sent");
        Next::Done
    })
    .unwrap();

    let res = send(&app, Method::GET, "/").await;
    assert_eq!(res.body, "one");
}

#[tokio::test]
#[traced_test]
async fn unhandled_errors_are_logged_outside_test_env() {
    let app = Application::new();
    app.set("env", "development").unwrap();
    app.use_handlers("/", fail("logged failure")).unwrap();

    send(&app, Method::GET, "/").await;
    assert!(logs_contain("unhandled error"));
    assert!(logs_contain("logged failure"));
}

#[tokio::test]
#[traced_test]
async fn test_env_silences_error_logging() {
    let app = test_app();
    app.use_handlers("/", fail("quiet failure")).unwrap();

    send(&app, Method::GET, "/").await;
    assert!(!logs_contain("quiet failure"));
}
