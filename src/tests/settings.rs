//! Settings that change request and response behaviour during dispatch.

use super::{send, send_request, send_with_headers, test_app};
use crate::{Application, Request, Response, handler};
use axum::{body::Body, extract::ConnectInfo};
use http::{Method, StatusCode};
use serde_json::json;
use std::net::SocketAddr;

/// A request arriving from `peer` with the given headers.
fn from_peer(peer: &str, uri: &str, headers: &[(&str, &str)]) -> http::Request<Body> {
    let mut builder = http::Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn client_info_app() -> Application {
    let app = test_app();
    app.get("/", handler(|req: Request, res: Response| async move {
        res.json(&json!({
            "ip": req.ip(),
            "ips": req.ips(),
            "protocol": req.protocol(),
            "secure": req.secure(),
            "hostname": req.hostname(),
        }))
    }))
    .unwrap();
    app
}

const FORWARDED: &[(&str, &str)] = &[
    ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
    ("x-forwarded-proto", "https"),
    ("x-forwarded-host", "public.example.com"),
    ("host", "internal:8080"),
];

#[tokio::test]
async fn proxies_are_untrusted_by_default() {
    let app = client_info_app();
    let res = send_request(&app, from_peer("127.0.0.1:4000", "/", FORWARDED)).await;
    assert_eq!(
        res.json(),
        json!({
            "ip": "127.0.0.1",
            "ips": [],
            "protocol": "http",
            "secure": false,
            "hostname": "internal",
        })
    );
}

#[tokio::test]
async fn trusted_ranges_stop_at_first_untrusted_hop() {
    let app = client_info_app();
    app.set("trust proxy", "loopback").unwrap();

    let res = send_request(&app, from_peer("127.0.0.1:4000", "/", FORWARDED)).await;
    let body = res.json();
    assert_eq!(body["ip"], "10.0.0.1");
    assert_eq!(body["ips"], json!(["10.0.0.1"]));
    assert_eq!(body["protocol"], "https");
    assert_eq!(body["secure"], true);
    assert_eq!(body["hostname"], "public.example.com");

    app.set("trust proxy", json!(["loopback", "uniquelocal"])).unwrap();
    let res = send_request(&app, from_peer("127.0.0.1:4000", "/", FORWARDED)).await;
    let body = res.json();
    assert_eq!(body["ip"], "203.0.113.9");
    assert_eq!(body["ips"], json!(["203.0.113.9", "10.0.0.1"]));
}

#[tokio::test]
async fn hop_count_trust() {
    let app = client_info_app();
    app.set("trust proxy", 1).unwrap();

    let res = send_request(&app, from_peer("192.0.2.1:4000", "/", FORWARDED)).await;
    assert_eq!(res.json()["ip"], "10.0.0.1");
}

#[tokio::test]
async fn json_spaces_and_escape() {
    let app = test_app();
    app.get("/", handler(|_req: Request, res: Response| async move {
        res.json(&json!({ "html": "<b>" }))
    }))
    .unwrap();

    assert_eq!(send(&app, Method::GET, "/").await.body, r#"{"html":"<b>"}"#);

    app.set("json spaces", 2).unwrap();
    app.enable("json escape").unwrap();
    assert_eq!(
        send(&app, Method::GET, "/").await.body,
        "{\n  \"html\": \"\\u003cb\\u003e\"\n}"
    );
}

#[tokio::test]
async fn jsonp_callback_name() {
    let app = test_app();
    app.set("jsonp callback name", "cb").unwrap();
    app.get("/", handler(|_req: Request, res: Response| async move {
        res.jsonp(&json!({ "ok": true }))
    }))
    .unwrap();

    let res = send(&app, Method::GET, "/?cb=handle").await;
    assert_eq!(res.header("content-type"), Some("text/javascript; charset=utf-8"));
    assert_eq!(
        res.body,
        r#"/**/ typeof handle === 'function' && handle({"ok":true});"#
    );

    let res = send(&app, Method::GET, "/?callback=ignored").await;
    assert_eq!(res.body, r#"{"ok":true}"#);
}

#[tokio::test]
async fn etag_modes() {
    let app = test_app();
    app.get("/", handler(|_req: Request, res: Response| async move { res.send("body") }))
        .unwrap();

    let weak = send(&app, Method::GET, "/").await;
    assert!(weak.header("etag").unwrap().starts_with("W/\""));

    app.set("etag", "strong").unwrap();
    let strong = send(&app, Method::GET, "/").await;
    let tag = strong.header("etag").unwrap().to_string();
    assert!(tag.starts_with('"'));

    let cached = send_with_headers(&app, Method::GET, "/", &[("if-none-match", &tag)]).await;
    assert_eq!(cached.status, StatusCode::NOT_MODIFIED);

    app.disable("etag").unwrap();
    assert!(send(&app, Method::GET, "/").await.header("etag").is_none());
}

#[tokio::test]
async fn query_parser_modes() {
    let app = test_app();
    app.get("/", handler(|req: Request, res: Response| async move { res.json(&req.query()) }))
        .unwrap();
    let uri = "/?user%5Bname%5D=ann&tags%5B%5D=a&tags%5B%5D=b";

    assert_eq!(
        send(&app, Method::GET, uri).await.json(),
        json!({ "user": { "name": "ann" }, "tags": ["a", "b"] })
    );

    app.set("query parser", "simple").unwrap();
    assert_eq!(
        send(&app, Method::GET, uri).await.json(),
        json!({ "user[name]": "ann", "tags[]": ["a", "b"] })
    );

    app.set("query parser", false).unwrap();
    assert_eq!(send(&app, Method::GET, uri).await.json(), json!({}));
}

#[tokio::test]
async fn subdomain_offset() {
    let app = test_app();
    app.get("/", handler(|req: Request, res: Response| async move { res.json(&req.subdomains()) }))
        .unwrap();
    let headers = [("host", "tobi.ferrets.example.com")];

    let res = send_with_headers(&app, Method::GET, "/", &headers).await;
    assert_eq!(res.json(), json!(["ferrets", "tobi"]));

    app.set("subdomain offset", 3).unwrap();
    let res = send_with_headers(&app, Method::GET, "/", &headers).await;
    assert_eq!(res.json(), json!(["tobi"]));
}
