use {
    super::{
        handler::{Handler, IntoHandlers, Next, ParamHandler, error_handler, handler},
        layer::Layer,
        path::{MatchOptions, PathMatch},
        route::Route,
    },
    crate::{
        Error, IntoNext, Request, Response, Result, RouterOptions,
        utils::{read, write},
    },
    futures::future::{BoxFuture, FutureExt},
    http::{Method, header},
    std::{
        collections::HashMap,
        fmt,
        future::Future,
        sync::{Arc, RwLock},
    },
};

type ParamHandlers = HashMap<String, Vec<Arc<dyn ParamHandler>>>;

struct RouterInner {
    options: RouterOptions,
    stack: RwLock<Vec<Arc<Layer>>>,
    params: RwLock<ParamHandlers>,
}

/// An ordered middleware stack.
///
/// Layers run in registration order. Plain handlers added with
/// [`use_handlers`](Router::use_handlers) match path prefixes; routes added
/// with [`route`](Router::route) or the per-method helpers match full paths.
/// Routers and applications can be mounted inside one another.
///
/// ```rust
/// use axum_relay::{Next, Request, Response, Router, handler};
///
/// # fn main() -> axum_relay::Result<()> {
/// let api = Router::new();
/// api.middleware("/", |_req: Request, _res: Response| async { Next::Continue })?
///     .get("/users/:id", handler(|req: Request, res: Response| async move {
///         res.send(format!("user {}", req.param("id").unwrap_or_default()))
///     }))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of running the param handlers for one layer.
#[derive(Clone)]
enum ParamOutcome {
    Proceed,
    SkipLayer,
    ExitRouter,
    Done,
    Failed(Error),
}

/// Per-request memo of param handler runs, keyed by param name.
struct ParamCall {
    matched: String,
    value: Option<String>,
    stop: Option<ParamOutcome>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                options,
                stack: RwLock::new(Vec::new()),
                params: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        self.inner.options
    }

    /// Snapshot of the current stack.
    pub fn layers(&self) -> Vec<Arc<Layer>> {
        read(&self.inner.stack).clone()
    }

    pub fn ptr_eq(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =======================================================================
    // Registration
    // =======================================================================

    /// Adds prefix-matching layers at `path`, one per handler.
    ///
    /// Fails when no handler is given or when `path` does not compile.
    pub fn use_handlers(&self, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return Err(Error::config("Router.use() requires a middleware function"));
        }

        let options = MatchOptions {
            sensitive: self.inner.options.case_sensitive,
            strict: false,
            end: false,
        };
        let layers = handlers
            .into_iter()
            .map(|h| Layer::new(path, options, h).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        for layer in &layers {
            if let Handler::App(app) = layer.handler() {
                app.set_mountpath(path);
            }
            tracing::debug!(path, handler = layer.name(), "middleware registered");
        }
        write(&self.inner.stack).extend(layers);
        Ok(self)
    }

    /// Adds a request handler matching the `path` prefix.
    pub fn middleware<F, Fut, R>(&self, path: &str, f: F) -> Result<&Self>
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoNext,
    {
        self.use_handlers(path, handler(f))
    }

    /// Adds an error handler matching the `path` prefix.
    pub fn error_middleware<F, Fut, R>(&self, path: &str, f: F) -> Result<&Self>
    where
        F: Fn(Error, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoNext,
    {
        self.use_handlers(path, error_handler(f))
    }

    /// Mounts a router or application under `path`.
    pub fn mount(&self, path: &str, target: impl Into<Handler>) -> Result<&Self> {
        self.use_handlers(path, target.into())
    }

    /// Creates a route for `path` and appends it to the stack.
    pub fn route(&self, path: &str) -> Result<Route> {
        let route = Route::new(path);
        let options = MatchOptions {
            sensitive: self.inner.options.case_sensitive,
            strict: self.inner.options.strict,
            end: true,
        };
        let layer = Layer::for_route(path, options, route.clone())?;
        tracing::debug!(path, "route created");
        write(&self.inner.stack).push(Arc::new(layer));
        Ok(route)
    }

    /// Creates a route for `path` answering `method` with `handlers`.
    pub fn register(&self, method: Method, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        self.route(path)?.register(Some(method), handlers);
        Ok(self)
    }

    super::method_helpers!(path);

    /// Creates a route for `path` answering every method.
    pub fn all(&self, path: &str, handlers: impl IntoHandlers) -> Result<&Self> {
        self.route(path)?.all(handlers);
        Ok(self)
    }

    /// Registers a handler run before any layer capturing `name`.
    ///
    /// It runs once per request and router for a given value; handlers for
    /// the same name run in registration order. A leading `:` is ignored.
    pub fn param(&self, name: &str, f: impl ParamHandler) -> &Self {
        let name = name.strip_prefix(':').unwrap_or(name);
        write(&self.inner.params)
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(f));
        self
    }

    // =======================================================================
    // Dispatch
    // =======================================================================

    /// Walks the stack for one request.
    ///
    /// Resolves to [`Next::Continue`] when the request fell through (or a
    /// handler returned [`Next::Router`]), [`Next::Done`] when it was handled
    /// and `Err` when an error escaped every error handler.
    pub fn handle(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        let router = self.clone();
        async move { router.run(req, res).await }.boxed()
    }

    async fn run(&self, req: Request, res: Response) -> Result<Next> {
        let stack = self.layers();
        let parent_params = req.params();
        let parent_url = req.base_url();
        let method = req.method();
        let mut allowed: Vec<String> = Vec::new();
        let mut called: HashMap<String, ParamCall> = HashMap::new();
        let mut error: Option<Error> = None;
        let mut idx = 0;

        let outcome = 'walk: loop {
            let path = req.path();

            let mut found: Option<(Arc<Layer>, PathMatch)> = None;
            while idx < stack.len() {
                let layer = stack[idx].clone();
                idx += 1;
                let matched = match layer.match_path(&path) {
                    Ok(Some(m)) => m,
                    Ok(None) => continue,
                    Err(err) => {
                        error.get_or_insert(err);
                        continue;
                    }
                };
                if let Some(route) = layer.route() {
                    if error.is_some() {
                        continue;
                    }
                    let handles = route.handles_method(&method);
                    if !handles && method == Method::OPTIONS {
                        for m in route.allowed_methods() {
                            if !allowed.contains(&m) {
                                allowed.push(m);
                            }
                        }
                    }
                    if !handles && method != Method::HEAD {
                        continue;
                    }
                }
                found = Some((layer, matched));
                break;
            }

            let Some((layer, matched)) = found else {
                break match error.take() {
                    Some(err) => Err(err),
                    None => Ok(Next::Continue),
                };
            };

            req.set_params(if self.inner.options.merge_params {
                matched.params.merge_with_parent(&parent_params)
            } else {
                matched.params
            });

            match self.process_params(&layer, &mut called, &req, &res).await {
                ParamOutcome::Proceed => {}
                ParamOutcome::SkipLayer => continue,
                ParamOutcome::ExitRouter if error.is_none() => break Ok(Next::Continue),
                ParamOutcome::ExitRouter => continue,
                ParamOutcome::Done => break Ok(Next::Done),
                ParamOutcome::Failed(err) => {
                    error.get_or_insert(err);
                    continue;
                }
            }

            let result = if layer.route().is_some() {
                layer.handle_request(req.clone(), res.clone()).await
            } else {
                let consumed = matched.path;
                let mut trimmed = None;
                if !consumed.is_empty() {
                    let Some(rest) = path.strip_prefix(consumed.as_str()) else {
                        continue 'walk;
                    };
                    if !matches!(rest.chars().next(), None | Some('/') | Some('.')) {
                        continue 'walk;
                    }

                    let url = req.url();
                    let remainder = url.get(consumed.len()..).unwrap_or_default();
                    let slash_added = !remainder.starts_with('/');
                    req.set_url(if slash_added {
                        format!("/{remainder}")
                    } else {
                        remainder.to_string()
                    });
                    req.set_base_url(format!(
                        "{parent_url}{}",
                        consumed.strip_suffix('/').unwrap_or(consumed.as_str())
                    ));
                    trimmed = Some((consumed, slash_added));
                }

                let result = match error.take() {
                    Some(err) => layer.handle_error(err, req.clone(), res.clone()).await,
                    None => layer.handle_request(req.clone(), res.clone()).await,
                };

                if let Some((removed, slash_added)) = trimmed {
                    let url = req.url();
                    let url = if slash_added { url.get(1..).unwrap_or_default() } else { &url };
                    req.set_url(format!("{removed}{url}"));
                    req.set_base_url(parent_url.clone());
                }
                result
            };

            match result {
                Ok(Next::Continue | Next::Route) => {}
                Ok(Next::Router) => break Ok(Next::Continue),
                Ok(Next::Done) => break Ok(Next::Done),
                Err(err) => error = Some(err),
            }
        };

        req.set_base_url(parent_url);
        req.set_params(parent_params);

        if method == Method::OPTIONS && matches!(outcome, Ok(Next::Continue)) && !allowed.is_empty() {
            let body = allowed.join(",");
            tracing::trace!(allow = %body, "automatic OPTIONS response");
            res.set_header(header::ALLOW.as_str(), &body)?;
            res.send(body)?;
            return Ok(Next::Done);
        }
        outcome
    }

    async fn process_params(
        &self,
        layer: &Layer,
        called: &mut HashMap<String, ParamCall>,
        req: &Request,
        res: &Response,
    ) -> ParamOutcome {
        let keys = layer.keys();
        if keys.is_empty() {
            return ParamOutcome::Proceed;
        }

        for name in keys {
            let Some(value) = req.param(&name) else {
                continue;
            };
            let Some(handlers) = read(&self.inner.params).get(&name).cloned() else {
                continue;
            };

            if let Some(call) = called.get(&name)
                && (call.matched == value
                    || matches!(call.stop, Some(ParamOutcome::Failed(_) | ParamOutcome::ExitRouter)))
            {
                req.insert_param(&name, call.value.clone());
                match &call.stop {
                    Some(stop) => return stop.clone(),
                    None => continue,
                }
            }

            let mut stop = None;
            for h in handlers {
                let outcome = super::handler::guarded(|| h.call(req.clone(), res.clone(), value.clone())).await;
                match outcome {
                    Ok(Next::Continue) => {}
                    Ok(Next::Route) => stop = Some(ParamOutcome::SkipLayer),
                    Ok(Next::Router) => stop = Some(ParamOutcome::ExitRouter),
                    Ok(Next::Done) => stop = Some(ParamOutcome::Done),
                    Err(err) => stop = Some(ParamOutcome::Failed(err)),
                }
                if stop.is_some() {
                    break;
                }
            }

            called.insert(
                name.clone(),
                ParamCall {
                    matched: value,
                    value: req.param(&name),
                    stop: stop.clone(),
                },
            );
            if let Some(stop) = stop {
                return stop;
            }
        }
        ParamOutcome::Proceed
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.inner.options)
            .field("stack", &read(&self.inner.stack))
            .finish()
    }
}
