//! The top-level application.
//!
//! An [`Application`] owns a lazily created root [`Router`], a table of
//! settings, view engines and `locals`. Applications can be mounted inside
//! one another with [`Application::use_handlers`]; a mounted application
//! reads any setting it never set itself from its ancestors.
//!
//! ```rust,no_run
//! use axum_relay::{Application, Config, Request, Response, Result, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load();
//!     config.setup_tracing();
//!
//!     let app = Application::from_config(&config)?;
//!     app.get("/", handler(|_req: Request, res: Response| async move { res.send("hello") }))?;
//!
//!     let admin = Application::new();
//!     admin.get("/", handler(|req: Request, res: Response| async move {
//!         res.send(format!("admin at {}", req.base_url()))
//!     }))?;
//!     app.use_handlers("/admin", admin)?;
//!
//!     app.listen(&config.http).await
//! }
//! ```

mod compiled;
mod finalize;
mod server;
mod settings;
mod view;

pub use compiled::*;
pub use settings::truthy;
pub use view::*;

use {
    crate::{
        AppContext, Config, Error, Handler, IntoHandlers, IntoNext, Next, ParamHandler, Request,
        Response, Result, Route, Router, RouterOptions,
        utils::{read, write},
    },
    futures::future::{self, BoxFuture, FutureExt},
    http::{HeaderName, HeaderValue, Method},
    serde_json::{Map, Value},
    settings::{Compiled, Setting, Settings},
    std::{
        collections::HashMap,
        fmt,
        future::Future,
        sync::{Arc, OnceLock, RwLock, Weak},
    },
    view::ResolvedView,
};

/// Value of the `X-Powered-By` header while the `x-powered-by` setting is enabled.
pub const POWERED_BY: &str = "axum-relay";

/// Largest indentation honoured for the `json spaces` setting.
const MAX_JSON_SPACES: u64 = 10;

type MountListener = Arc<dyn Fn(&Application) + Send + Sync>;

struct AppInner {
    settings: RwLock<Settings>,
    parent: RwLock<Weak<AppInner>>,
    mountpath: RwLock<String>,
    router: OnceLock<Router>,
    engines: RwLock<HashMap<String, Arc<dyn ViewEngine>>>,
    view_cache: RwLock<HashMap<String, ResolvedView>>,
    locals: RwLock<Map<String, Value>>,
    mount_listeners: RwLock<Vec<MountListener>>,
}

/// An application: a root router plus settings, views and mount wiring.
///
/// `Application` is a cheap `Clone` handle; clones share the same state.
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("mountpath", &self.mountpath())
            .field("mounted", &self.parent().is_some())
            .field("router", &self.inner.router.get().is_some())
            .finish()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppInner {
                settings: RwLock::new(Settings::new()),
                parent: RwLock::new(Weak::new()),
                mountpath: RwLock::new("/".to_string()),
                router: OnceLock::new(),
                engines: RwLock::new(HashMap::new()),
                view_cache: RwLock::new(HashMap::new()),
                locals: RwLock::new(Map::new()),
                mount_listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Builds an application from the `[routing]` and `[settings]` sections of `config`.
    ///
    /// Fails when a setting has a value its key does not accept.
    pub fn from_config(config: &Config) -> Result<Self> {
        let app = Self::new();
        if let Some(env) = &config.env {
            app.set("env", env.as_str())?;
        }
        app.set("case sensitive routing", config.routing.case_sensitive)?
            .set("strict routing", config.routing.strict)?
            .set("merge params", config.routing.merge_params)?;
        for (key, value) in &config.settings {
            app.set(key, serde_json::to_value(value)?)?;
        }
        Ok(app)
    }

    /// The root router, created on first use from the routing settings.
    pub fn router(&self) -> &Router {
        self.inner.router.get_or_init(|| {
            let options = RouterOptions::default()
                .with_case_sensitive(self.enabled("case sensitive routing"))
                .with_strict(self.enabled("strict routing"))
                .with_merge_params(self.enabled("merge params"));
            tracing::debug!(?options, "root router created");
            Router::with_options(options)
        })
    }

    pub fn ptr_eq(&self, other: &Application) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =======================================================================
    // Registration
    // =======================================================================

    /// Adds prefix-matching handlers at `path` to the root router.
    ///
    /// Mounted applications get their mount path and parent set, start
    /// inheriting this application's settings and fire their mount listeners.
    pub fn use_handlers(&self, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return Err(Error::config("app.use() requires a middleware function"));
        }

        let children: Vec<Application> = handlers
            .iter()
            .filter_map(|h| match h {
                Handler::App(app) => Some(app.clone()),
                _ => None,
            })
            .collect();
        if children.iter().any(|child| self.is_within(child)) {
            return Err(Error::config(format!(
                "cannot mount an application at '{path}' inside itself"
            )));
        }

        self.router().use_handlers(path, handlers)?;

        for child in children {
            child.set_mountpath(path);
            *write(&child.inner.parent) = Arc::downgrade(&self.inner);
            tracing::debug!(mountpath = path, "application mounted");
            child.emit_mount(self);
        }
        Ok(self)
    }

    /// Adds a request handler matching the `path` prefix.
    pub fn middleware<F, Fut, R>(&self, path: &str, f: F) -> Result<&Self>
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoNext,
    {
        self.use_handlers(path, crate::handler(f))
    }

    /// Adds an error handler matching the `path` prefix.
    pub fn error_middleware<F, Fut, R>(&self, path: &str, f: F) -> Result<&Self>
    where
        F: Fn(Error, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoNext,
    {
        self.use_handlers(path, crate::error_handler(f))
    }

    /// Mounts a router or application under `path`.
    pub fn mount(&self, path: &str, target: impl Into<Handler>) -> Result<&Self> {
        self.use_handlers(path, target.into())
    }

    pub fn route(&self, path: &str) -> Result<Route> {
        self.router().route(path)
    }

    pub fn register(&self, method: Method, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        self.router().register(method, path, handlers)?;
        Ok(self)
    }

    crate::routing::method_helpers!(path);

    pub fn all(&self, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        self.router().all(path, handlers)?;
        Ok(self)
    }

    /// See [`Router::param`].
    pub fn param(&self, name: &str, f: impl ParamHandler) -> &Self {
        self.router().param(name, f);
        self
    }

    // =======================================================================
    // Settings
    // =======================================================================

    /// Assigns a setting.
    ///
    /// `etag`, `query parser` and `trust proxy` are validated and compiled
    /// here; an unsupported value is a configuration error.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<&Self> {
        let value = value.into();
        tracing::debug!(key, %value, "setting updated");
        write(&self.inner.settings).set(key, value)?;
        Ok(self)
    }

    /// Current value of a setting, including inherited values and defaults.
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.lookup(key).map(|s| s.value)
    }

    pub fn enabled(&self, key: &str) -> bool {
        self.setting(key).is_some_and(|v| truthy(&v))
    }

    pub fn disabled(&self, key: &str) -> bool {
        !self.enabled(key)
    }

    pub fn enable(&self, key: &str) -> Result<&Self> {
        self.set(key, true)
    }

    pub fn disable(&self, key: &str) -> Result<&Self> {
        self.set(key, false)
    }

    pub fn env(&self) -> String {
        self.setting("env")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn etag_mode(&self) -> EtagMode {
        match self.compiled("etag") {
            Some(Compiled::Etag(mode)) => mode,
            _ => EtagMode::default(),
        }
    }

    pub fn query_parser(&self) -> QueryParser {
        match self.compiled("query parser") {
            Some(Compiled::Query(parser)) => parser,
            _ => QueryParser::default(),
        }
    }

    pub fn trust_proxy(&self) -> TrustProxy {
        match self.compiled("trust proxy") {
            Some(Compiled::Trust(trust)) => trust,
            _ => TrustProxy::default(),
        }
    }

    /// Own overrides, then each ancestor's overrides, then own defaults.
    fn lookup(&self, key: &str) -> Option<Setting> {
        if let Some(setting) = read(&self.inner.settings).own(key) {
            return Some(setting.clone());
        }
        let mut ancestor = self.parent();
        while let Some(app) = ancestor {
            if let Some(setting) = read(&app.inner.settings).own(key) {
                return Some(setting.clone());
            }
            ancestor = app.parent();
        }
        read(&self.inner.settings).default_of(key).cloned()
    }

    fn compiled(&self, key: &str) -> Option<Compiled> {
        self.lookup(key).and_then(|s| s.compiled)
    }

    // =======================================================================
    // Locals
    // =======================================================================

    /// Variables available to every view this application renders.
    pub fn locals(&self) -> Map<String, Value> {
        read(&self.inner.locals).clone()
    }

    pub fn set_local(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        write(&self.inner.locals).insert(key.into(), value.into());
        self
    }

    // =======================================================================
    // Mounting
    // =======================================================================

    /// The path this application was mounted at, `/` until mounted.
    pub fn mountpath(&self) -> String {
        read(&self.inner.mountpath).clone()
    }

    pub(crate) fn set_mountpath(&self, path: &str) {
        *write(&self.inner.mountpath) = path.to_string();
    }

    /// The application this one is mounted in.
    pub fn parent(&self) -> Option<Application> {
        read(&self.inner.parent)
            .upgrade()
            .map(|inner| Application { inner })
    }

    /// Absolute mount path: the parent's path followed by the mount path.
    ///
    /// Empty for an application that is not mounted.
    pub fn path(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}{}", parent.path(), self.mountpath()),
            None => String::new(),
        }
    }

    /// True when `other` is this application or one of its ancestors.
    fn is_within(&self, other: &Application) -> bool {
        let mut current = Some(self.clone());
        while let Some(app) = current {
            if app.ptr_eq(other) {
                return true;
            }
            current = app.parent();
        }
        false
    }

    /// Registers a listener called with the parent each time this application is mounted.
    pub fn on_mount<F>(&self, f: F) -> &Self
    where
        F: Fn(&Application) + Send + Sync + 'static,
    {
        write(&self.inner.mount_listeners).push(Arc::new(f));
        self
    }

    fn emit_mount(&self, parent: &Application) {
        let listeners = read(&self.inner.mount_listeners).clone();
        for listener in listeners {
            listener(parent);
        }
    }

    // =======================================================================
    // Dispatch
    // =======================================================================

    /// Settings consulted while this application dispatches a request.
    pub fn context(&self) -> AppContext {
        let json_spaces = match self.setting("json spaces") {
            Some(Value::Number(n)) => n
                .as_u64()
                .filter(|n| *n > 0)
                .map(|n| " ".repeat(n.min(MAX_JSON_SPACES) as usize)),
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        AppContext {
            app: Some(self.clone()),
            etag: self.etag_mode(),
            query_parser: self.query_parser(),
            trust_proxy: self.trust_proxy(),
            subdomain_offset: self
                .setting("subdomain offset")
                .and_then(|v| v.as_u64())
                .map_or(2, |n| n as usize),
            json_spaces,
            json_escape: self.enabled("json escape"),
            jsonp_callback: self
                .setting("jsonp callback name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "callback".to_string()),
        }
    }

    /// Runs the request through this application without finalizing it.
    ///
    /// Installs this application's [`AppContext`] for the duration of the
    /// call and restores the caller's afterwards. Without any registered
    /// handler the request is deferred with [`Next::Continue`].
    pub fn dispatch(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        let Some(router) = self.inner.router.get().cloned() else {
            return future::ready(Ok(Next::Continue)).boxed();
        };
        let context = self.context();
        let powered_by = self.enabled("x-powered-by");

        async move {
            let previous = req.swap_context(Some(context));
            if powered_by {
                res.insert_header(
                    HeaderName::from_static("x-powered-by"),
                    HeaderValue::from_static(POWERED_BY),
                );
            }
            let result = router.handle(req.clone(), res).await;
            req.swap_context(previous);
            result
        }
        .boxed()
    }
}
