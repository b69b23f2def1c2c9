//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener and
//! `serve()` accepts connections until shutdown. Routes are registered
//! between `new()` and `serve()`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{health_handler, liveness_handler, readiness_handler, AppState};
use super::shutdown::ShutdownController;
use crate::middleware::{build_http_layers, trim_trailing_slash, TraceConfig};

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    trace: TraceConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, trace: TraceConfig) -> Self {
        Self {
            config,
            trace,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Shared controller for health reporting and triggering shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Wraps the application routes with the health routes and the middleware stack.
    ///
    /// Built-in routes:
    /// - `GET /health` -- status JSON, unless `include_health` is false
    /// - `GET /health/live` -- liveness check
    /// - `GET /health/ready` -- readiness check
    #[must_use]
    pub fn build_router(&self, routes: Router, include_health: bool) -> Router {
        let mut builtin = Router::new()
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler));
        if include_health {
            builtin = builtin.route("/health", get(health_handler));
        }
        let builtin = builtin.with_state(AppState::new(Arc::clone(&self.shutdown)));

        routes
            .merge(builtin)
            .layer(build_http_layers(&self.config, self.trace.clone()))
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves `router` until `shutdown` resolves or the controller is
    /// triggered, then waits for in-flight requests to finish.
    ///
    /// Trailing slashes are trimmed before routing, and the peer address is
    /// available to handlers and the rate limiter as `ConnectInfo<SocketAddr>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        router: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let controller = self.shutdown;

        let signal = {
            let controller = Arc::clone(&controller);
            async move {
                tokio::select! {
                    () = shutdown => {}
                    () = controller.wait_for_shutdown() => {}
                }
                info!("shutdown requested, draining connections");
                controller.trigger_shutdown();
            }
        };

        let app = trim_trailing_slash(router);
        let make_service =
            axum::ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app);

        controller.set_ready();
        axum::serve(listener, make_service)
            .with_graceful_shutdown(signal)
            .await?;

        controller.mark_stopped();
        info!("server stopped");
        Ok(())
    }
}
