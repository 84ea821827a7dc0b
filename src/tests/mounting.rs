//! Sub-applications and routers mounted at a path prefix.

use super::{entries, record, respond, send, test_app, trail};
use crate::{Application, Next, Request, Response, Router, handler};
use http::{Method, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn mounted_app_sees_its_mount_path() {
    let app = test_app();
    let blog = Application::new();
    blog.get("/:slug", handler(|req: Request, res: Response| async move {
        let app = req.app().unwrap();
        res.send(format!(
            "{}|{}|{}|{}",
            app.mountpath(),
            req.base_url(),
            req.url(),
            req.param("slug").unwrap_or_default()
        ))
    }))
    .unwrap();
    app.use_handlers("/blog", blog.clone()).unwrap();

    assert_eq!(blog.mountpath(), "/blog");
    assert!(blog.parent().unwrap().ptr_eq(&app));

    let res = send(&app, Method::GET, "/blog/hello-world").await;
    assert_eq!(res.body, "/blog|/blog|/hello-world|hello-world");
}

#[tokio::test]
async fn nested_mounts_compose_paths() {
    let app = test_app();
    let blog = Application::new();
    let admin = Application::new();
    admin.get("/", handler(|req: Request, res: Response| async move {
        let app = req.app().unwrap();
        res.send(format!("{}|{}", app.path(), req.base_url()))
    }))
    .unwrap();
    blog.use_handlers("/admin", admin.clone()).unwrap();
    app.use_handlers("/blog", blog).unwrap();

    assert_eq!(admin.path(), "/blog/admin");
    let res = send(&app, Method::GET, "/blog/admin").await;
    assert_eq!(res.body, "/blog/admin|/blog/admin");
}

#[tokio::test]
async fn parent_context_is_restored_after_sub_app() {
    let app = test_app();
    app.set("name", "parent").unwrap();
    let child = Application::new();
    child.set("name", "child").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    child
        .middleware("/", move |req: Request, _res: Response| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(req.app().unwrap().setting("name"));
                Next::Continue
            }
        })
        .unwrap();
    app.use_handlers("/child", child).unwrap();
    app.middleware("/", |req: Request, res: Response| async move {
        let name = req.app().and_then(|a| a.setting("name")).unwrap_or_default();
        res.send(name.as_str().unwrap_or_default().to_string())
    })
    .unwrap();

    let res = send(&app, Method::GET, "/child/page").await;
    assert_eq!(res.body, "parent");
    assert_eq!(*seen.lock().unwrap(), vec![Some(json!("child"))]);
}

#[tokio::test]
async fn parent_settings_changed_after_mount_are_inherited() {
    let app = test_app();
    let child = Application::new();
    child.get("/", handler(|req: Request, res: Response| async move {
        let app = req.app().unwrap();
        res.send(app.setting("title").map(|v| v.to_string()).unwrap_or_default())
    }))
    .unwrap();
    app.use_handlers("/child", child.clone()).unwrap();

    app.set("title", "from parent").unwrap();
    assert_eq!(send(&app, Method::GET, "/child").await.body, "\"from parent\"");

    child.set("title", "own").unwrap();
    app.set("title", "changed again").unwrap();
    assert_eq!(send(&app, Method::GET, "/child").await.body, "\"own\"");
}

#[tokio::test]
async fn compiled_settings_are_inherited() {
    let app = test_app();
    app.set("query parser", "simple").unwrap();
    let child = Application::new();
    child.get("/", handler(|req: Request, res: Response| async move {
        res.json(&req.query())
    }))
    .unwrap();
    app.use_handlers("/child", child).unwrap();

    let res = send(&app, Method::GET, "/child?a%5Bb%5D=1").await;
    assert_eq!(res.json(), json!({ "a[b]": "1" }));
}

#[tokio::test]
async fn empty_sub_app_defers_to_parent() {
    let app = test_app();
    let t = trail();
    app.use_handlers("/empty", Application::new()).unwrap();
    app.get("/empty", respond(&t, "parent")).unwrap();

    assert_eq!(send(&app, Method::GET, "/empty").await.body, "parent");
}

#[tokio::test]
async fn mount_listener_fires_with_parent() {
    let app = test_app();
    app.set("marker", "parent app").unwrap();
    let child = Application::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    child.on_mount(move |parent| {
        *sink.lock().unwrap() = parent.setting("marker");
    });

    app.use_handlers("/child", child).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(json!("parent app")));
}

#[tokio::test]
async fn routers_mount_under_prefixes() {
    let app = test_app();
    let t = trail();
    let api = Router::new();
    let v1 = Router::new();
    v1.get("/users", respond(&t, "v1 users")).unwrap();
    api.use_handlers("/v1", v1).unwrap();
    api.use_handlers("/", record(&t, "api fallthrough", Next::Continue))
        .unwrap();
    app.mount("/api", api).unwrap();

    assert_eq!(send(&app, Method::GET, "/api/v1/users").await.body, "v1 users");
    let res = send(&app, Method::GET, "/api/v2/users").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(entries(&t), vec!["v1 users", "api fallthrough"]);
}

#[tokio::test]
async fn sub_app_can_be_mounted_with_mount() {
    let app = test_app();
    let child = Application::new();
    let t = trail();
    child.get("/", respond(&t, "child")).unwrap();
    app.mount("/c", child.clone()).unwrap();

    assert_eq!(child.mountpath(), "/c");
    assert_eq!(send(&app, Method::GET, "/c").await.body, "child");
}

#[tokio::test]
async fn app_mounted_on_router_records_mount_path() {
    let app = test_app();
    let api = Router::new();
    let child = Application::new();
    let t = trail();
    child.get("/status", respond(&t, "status")).unwrap();
    api.mount("/v1", child.clone()).unwrap();
    app.mount("/api", api).unwrap();

    assert_eq!(child.mountpath(), "/v1");
    assert!(child.parent().is_none());
    assert_eq!(send(&app, Method::GET, "/api/v1/status").await.body, "status");
}
