//! Serving an application over TCP with axum.

use {
    super::Application,
    crate::{HttpConfig, Result},
    axum::body::Body,
    futures::future::{BoxFuture, FutureExt},
    std::{
        convert::Infallible,
        net::SocketAddr,
        task::{Context, Poll},
        time::Duration,
    },
    tokio::{net::TcpListener, signal},
    tokio_util::sync::CancellationToken,
    tower::Service,
    tower_http::trace::TraceLayer,
};

impl Service<http::Request<Body>> for Application {
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Body>) -> Self::Future {
        let app = self.clone();
        async move { Ok(app.handle(req).await) }.boxed()
    }
}

impl Application {
    /// An axum router answering every request with this application.
    pub fn into_router(self) -> axum::Router {
        axum::Router::new()
            .fallback_service(self)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves on `listener` until `shutdown` is cancelled.
    ///
    /// In-flight requests get `grace` to finish once shutdown starts; the
    /// server is dropped when that expires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
        grace: Duration,
    ) -> Result<()> {
        tracing::info!("Waiting for connections on {}", listener.local_addr()?);

        let service = self
            .into_router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let signal = shutdown.clone();
        let serve_future = axum::serve(listener, service)
            .with_graceful_shutdown(async move { signal.cancelled().await });

        // The grace timeout only starts once shutdown has been requested.
        tokio::select! {
            result = serve_future => {
                tracing::info!("Graceful shutdown completed");
                result?;
            }
            _ = async {
                shutdown.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!("Graceful shutdown timeout expired, forcing shutdown");
            }
        }

        Ok(())
    }

    /// Binds the configured address and serves until Ctrl+C or SIGTERM.
    pub async fn listen(&self, config: &HttpConfig) -> Result<()> {
        config.validate()?;
        let bind_addr = config.full_bind_addr();
        let listener = TcpListener::bind(&bind_addr).await?;
        tracing::info!("Bound to {}", &bind_addr);

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        let timeout = config.shutdown_timeout;
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!(
                "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
                timeout.as_secs()
            );
            trigger.cancel();
        });

        self.clone().serve(listener, shutdown, timeout).await
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::debug!("Ctrl+C signal received"),
            Err(err) => {
                tracing::warn!("Failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                handler.recv().await;
                tracing::debug!("SIGTERM signal received");
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
