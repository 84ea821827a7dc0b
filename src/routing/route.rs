use {
    super::{
        handler::{IntoHandlers, Next},
        layer::Layer,
    },
    crate::{
        Error, Request, Response, Result,
        utils::{read, write},
    },
    futures::future::{self, BoxFuture, FutureExt},
    http::Method,
    std::{
        fmt,
        sync::{Arc, RwLock},
    },
};

#[derive(Default)]
struct Methods {
    all: bool,
    list: Vec<Method>,
}

struct RouteInner {
    path: String,
    stack: RwLock<Vec<Arc<Layer>>>,
    methods: RwLock<Methods>,
}

/// A fixed path with one handler chain per HTTP method.
///
/// Created through [`Router::route`](crate::Router::route), which also places
/// the route on the router's stack. Cloning yields another handle to the same route.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

impl Route {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RouteInner {
                path: path.into(),
                stack: RwLock::new(Vec::new()),
                methods: RwLock::new(Methods::default()),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Appends handlers for `method`, or for every method when `None`.
    pub fn register(&self, method: Option<Method>, handlers: impl IntoHandlers) -> &Self {
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return self;
        }

        {
            let mut methods = write(&self.inner.methods);
            match &method {
                None => methods.all = true,
                Some(m) if !methods.list.contains(m) => methods.list.push(m.clone()),
                Some(_) => {}
            }
        }

        tracing::debug!(
            path = %self.inner.path,
            method = method.as_ref().map_or("*", Method::as_str),
            count = handlers.len(),
            "route handlers registered"
        );
        write(&self.inner.stack).extend(
            handlers
                .into_iter()
                .map(|h| Arc::new(Layer::for_method(method.clone(), h))),
        );
        self
    }

    super::method_helpers!(route);

    /// Handlers for every method.
    pub fn all(&self, handlers: impl IntoHandlers) -> &Self {
        self.register(None, handlers)
    }

    /// True when a request with `method` would run at least one handler.
    /// HEAD is served by GET handlers unless HEAD is registered explicitly.
    pub fn handles_method(&self, method: &Method) -> bool {
        let methods = read(&self.inner.methods);
        if methods.all {
            return true;
        }
        if *method == Method::HEAD && !methods.list.contains(&Method::HEAD) {
            return methods.list.contains(&Method::GET);
        }
        methods.list.contains(method)
    }

    /// Methods listed in an automatic `Allow` header.
    pub fn allowed_methods(&self) -> Vec<String> {
        let methods = read(&self.inner.methods);
        let mut allowed: Vec<String> = methods
            .list
            .iter()
            .map(|m| m.as_str().to_ascii_uppercase())
            .collect();
        if methods.list.contains(&Method::GET) && !methods.list.contains(&Method::HEAD) {
            allowed.push(Method::HEAD.to_string());
        }
        allowed
    }

    pub(crate) fn dispatch(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        let stack = read(&self.inner.stack).clone();
        if stack.is_empty() {
            return future::ready(Ok(Next::Continue)).boxed();
        }

        let explicit_head = read(&self.inner.methods).list.contains(&Method::HEAD);
        let path = self.inner.path.clone();
        async move {
            let mut method = req.method();
            if method == Method::HEAD && !explicit_head {
                method = Method::GET;
            }
            req.set_route_path(Some(path));

            let mut error: Option<Error> = None;
            for layer in &stack {
                if layer.method().is_some_and(|m| *m != method) {
                    continue;
                }
                let outcome = match error.take() {
                    Some(err) => layer.handle_error(err, req.clone(), res.clone()).await,
                    None => layer.handle_request(req.clone(), res.clone()).await,
                };
                match outcome {
                    Ok(Next::Continue) => {}
                    Ok(Next::Route) => return Ok(Next::Continue),
                    Ok(next @ (Next::Router | Next::Done)) => return Ok(next),
                    Err(err) => error = Some(err),
                }
            }

            match error {
                Some(err) => Err(err),
                None => Ok(Next::Continue),
            }
        }
        .boxed()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.inner.path)
            .field("methods", &self.allowed_methods())
            .field("stack", &read(&self.inner.stack).len())
            .finish()
    }
}
