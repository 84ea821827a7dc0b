use {
    super::{
        handler::{Handler, Next, RequestHandler, guarded},
        path::{MatchOptions, PathMatch, PathPattern},
        params::Params,
        route::Route,
    },
    crate::{Error, Request, Response, Result, utils::decode_param},
    futures::future::{self, BoxFuture, FutureExt},
    http::Method,
    std::{fmt, sync::Arc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastPath {
    None,
    /// `/` as a prefix: matches everything, consumes nothing.
    Root,
    /// `*`: matches everything, captures it as `0`.
    Star,
}

/// A path matcher paired with a handler: one entry of a middleware or route stack.
pub struct Layer {
    pattern: Option<PathPattern>,
    fast: FastPath,
    handler: Handler,
    method: Option<Method>,
    route: Option<Route>,
}

impl Layer {
    pub(crate) fn new(path: &str, options: MatchOptions, handler: Handler) -> Result<Self> {
        let fast = match path {
            "/" if !options.end => FastPath::Root,
            "*" => FastPath::Star,
            _ => FastPath::None,
        };
        Ok(Self {
            pattern: Some(PathPattern::compile(path, options)?),
            fast,
            handler,
            method: None,
            route: None,
        })
    }

    /// Terminal layer delegating to a route's method-specific stack.
    pub(crate) fn for_route(path: &str, options: MatchOptions, route: Route) -> Result<Self> {
        let dispatch = RouteDispatch(route.clone());
        let mut layer = Self::new(
            path,
            MatchOptions {
                end: true,
                ..options
            },
            Handler::Request(Arc::new(dispatch)),
        )?;
        layer.route = Some(route);
        Ok(layer)
    }

    /// Entry of a route's own stack. Never path-matched.
    pub(crate) fn for_method(method: Option<Method>, handler: Handler) -> Self {
        Self {
            pattern: None,
            fast: FastPath::None,
            handler,
            method,
            route: None,
        }
    }

    pub fn path(&self) -> &str {
        self.pattern.as_ref().map_or("/", |p| p.source())
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn is_error_handler(&self) -> bool {
        self.handler.is_error_handler()
    }

    /// Names of the params this layer's pattern can capture.
    pub fn keys(&self) -> Vec<String> {
        match self.fast {
            FastPath::Star => vec!["0".to_string()],
            FastPath::Root => Vec::new(),
            FastPath::None => self
                .pattern
                .as_ref()
                .map(|p| p.keys().iter().map(|k| k.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    /// Matches `path`, returning the consumed prefix and the decoded params.
    ///
    /// A capture that is not valid percent-encoding yields a `400` error.
    pub fn match_path(&self, path: &str) -> Result<Option<PathMatch>> {
        match self.fast {
            FastPath::Root => Ok(Some(PathMatch {
                path: String::new(),
                params: Params::new(),
            })),
            FastPath::Star => {
                let mut params = Params::new();
                params.insert("0", Some(decode_param(path)?));
                Ok(Some(PathMatch {
                    path: path.to_string(),
                    params,
                }))
            }
            FastPath::None => match &self.pattern {
                Some(pattern) => pattern.exec(path),
                None => Ok(None),
            },
        }
    }

    /// Runs the layer during normal dispatch. Error handlers are skipped.
    pub(crate) fn handle_request(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        tracing::trace!(layer = %self.name(), path = %self.path(), "handle request");
        match &self.handler {
            Handler::Request(h) => {
                let h = h.clone();
                guarded(move || h.call(req, res))
            }
            Handler::Error(_) => future::ready(Ok(Next::Continue)).boxed(),
            Handler::Router(router) => router.handle(req, res),
            Handler::App(app) => app.dispatch(req, res),
        }
    }

    /// Runs the layer while `err` is in flight. Only error handlers see it;
    /// every other layer hands it back untouched.
    pub(crate) fn handle_error(
        &self,
        err: Error,
        req: Request,
        res: Response,
    ) -> BoxFuture<'static, Result<Next>> {
        match &self.handler {
            Handler::Error(h) => {
                tracing::trace!(layer = %self.name(), error = %err, "handle error");
                let h = h.clone();
                guarded(move || h.call(err, req, res))
            }
            _ => future::ready(Err(err)).boxed(),
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("path", &self.path())
            .field("method", &self.method)
            .field("handler", &self.handler)
            .field("route", &self.route.is_some())
            .finish()
    }
}

struct RouteDispatch(Route);

impl RequestHandler for RouteDispatch {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        self.0.dispatch(req, res)
    }

    fn name(&self) -> &'static str {
        "route"
    }
}
