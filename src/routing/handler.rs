//! Handler contracts.
//!
//! A handler is an async function receiving the request and response handles.
//! Instead of calling a continuation, it returns a [`Next`] value (directly, as
//! `()`, or inside a `Result`) telling the dispatcher how to proceed:
//!
//! ```rust
//! use axum_relay::{Next, Request, Response, handler, error_handler, Error};
//!
//! // Middleware: do some work, then let the next layer run.
//! let logger = handler(|req: Request, _res: Response| async move {
//!     tracing::info!(url = %req.url(), "incoming");
//!     Next::Continue
//! });
//!
//! // Endpoint: respond and stop. `()` means the request was handled.
//! let hello = handler(|_req: Request, res: Response| async move { res.send("hello") });
//!
//! // Error handler: only invoked while an error is in flight.
//! let recover = error_handler(|err: Error, _req: Request, res: Response| async move {
//!     res.status(err.status_code()).send(err.to_string())
//! });
//! ```

use {
    crate::{Application, Error, Request, Response, Result, Router},
    futures::{
        FutureExt,
        future::{self, BoxFuture},
    },
    std::{
        any::type_name,
        fmt,
        future::Future,
        panic::{AssertUnwindSafe, catch_unwind},
        sync::Arc,
    },
};

/// How dispatch continues after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Run the next matching layer.
    Continue,
    /// Skip the remaining handlers of the current route.
    Route,
    /// Skip the remaining layers of the current router.
    Router,
    /// The request was handled; stop dispatching.
    Done,
}

/// Conversion of a handler's return value into a dispatch decision.
pub trait IntoNext {
    fn into_next(self) -> Result<Next>;
}

impl IntoNext for () {
    fn into_next(self) -> Result<Next> {
        Ok(Next::Done)
    }
}

impl IntoNext for Next {
    fn into_next(self) -> Result<Next> {
        Ok(self)
    }
}

impl<T, E> IntoNext for std::result::Result<T, E>
where
    T: IntoNext,
    E: Into<Error>,
{
    fn into_next(self) -> Result<Next> {
        match self {
            Ok(value) => value.into_next(),
            Err(err) => Err(err.into()),
        }
    }
}

/// A handler taking part in normal (non-error) dispatch.
pub trait RequestHandler: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>>;

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A handler only invoked while an error is in flight.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(&self, err: Error, req: Request, res: Response) -> BoxFuture<'static, Result<Next>>;

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A handler preprocessing a captured route parameter.
///
/// Receives the decoded value; may rewrite it through [`Request::set_param`].
pub trait ParamHandler: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response, value: String) -> BoxFuture<'static, Result<Next>>;
}

impl<F, Fut, R> RequestHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        let fut = self(req, res);
        async move { fut.await.into_next() }.boxed()
    }
}

impl<F, Fut, R> ErrorHandler for F
where
    F: Fn(Error, Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(&self, err: Error, req: Request, res: Response) -> BoxFuture<'static, Result<Next>> {
        let fut = self(err, req, res);
        async move { fut.await.into_next() }.boxed()
    }
}

impl<F, Fut, R> ParamHandler for F
where
    F: Fn(Request, Response, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    fn call(&self, req: Request, res: Response, value: String) -> BoxFuture<'static, Result<Next>> {
        let fut = self(req, res, value);
        async move { fut.await.into_next() }.boxed()
    }
}

/// Anything that can be placed on a middleware stack.
///
/// The role of a function is fixed when it is wrapped: use [`handler`] for
/// request handlers and [`error_handler`] for error handlers.
#[derive(Clone)]
pub enum Handler {
    Request(Arc<dyn RequestHandler>),
    Error(Arc<dyn ErrorHandler>),
    Router(Router),
    App(Application),
}

impl Handler {
    pub fn is_error_handler(&self) -> bool {
        matches!(self, Handler::Error(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Handler::Request(h) => h.name(),
            Handler::Error(h) => h.name(),
            Handler::Router(_) => "router",
            Handler::App(_) => "mounted_app",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name()).finish()
    }
}

impl From<Router> for Handler {
    fn from(router: Router) -> Self {
        Handler::Router(router)
    }
}

impl From<Application> for Handler {
    fn from(app: Application) -> Self {
        Handler::App(app)
    }
}

/// Wraps a request handler.
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    Handler::Request(Arc::new(f))
}

/// Wraps an error handler.
pub fn error_handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Error, Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoNext,
{
    Handler::Error(Arc::new(f))
}

/// One or more handlers, as accepted by every registration method.
pub trait IntoHandlers {
    fn into_handlers(self) -> Vec<Handler>;
}

impl IntoHandlers for Handler {
    fn into_handlers(self) -> Vec<Handler> {
        vec![self]
    }
}

impl IntoHandlers for Router {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::Router(self)]
    }
}

impl IntoHandlers for Application {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::App(self)]
    }
}

impl IntoHandlers for Vec<Handler> {
    fn into_handlers(self) -> Vec<Handler> {
        self
    }
}

impl<const N: usize> IntoHandlers for [Handler; N] {
    fn into_handlers(self) -> Vec<Handler> {
        self.into()
    }
}

impl IntoHandlers for Vec<Vec<Handler>> {
    fn into_handlers(self) -> Vec<Handler> {
        self.into_iter().flatten().collect()
    }
}

/// Runs a handler, turning a panic into an error.
///
/// Both a panic while the handler builds its future and a panic while that
/// future is polled end up as an [`ErrorKind::Panic`](crate::ErrorKind::Panic)
/// error, exactly as if the handler had returned it.
pub(crate) fn guarded<F>(call: F) -> BoxFuture<'static, Result<Next>>
where
    F: FnOnce() -> BoxFuture<'static, Result<Next>>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|payload| Err(Error::panic(payload))))
            .boxed(),
        Err(payload) => future::ready(Err(Error::panic(payload))).boxed(),
    }
}
