//! Application assembly: configuration, logging, JWT, routes, and server
//! lifecycle in one handle.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, Route};
use axum::Router;
use tollgate_core::{Claims, Logger, LoggerRegistry};
use tower::{Layer, Service};

use crate::auth::{TokenError, TokenIssuer};
use crate::config::{ConfigError, ServiceConfig};
use crate::middleware::{
    rate_limited, JwtAuthLayer, JwtConfig, RateLimitConfig, RateLimitError, TraceConfig,
};
use crate::network::{NetworkModule, ShutdownController};

/// A configured service, ready for routes and then [`run`](Self::run).
///
/// ```ignore
/// let app = Application::new(ServiceConfig::parse())?;
/// let protected = Router::new().route("/me", get(me));
/// let protected = match app.jwt() {
///     Some(jwt) => protected.route_layer(jwt),
///     None => protected,
/// };
/// app.nest("/api", protected).run(shutdown_signal()).await?;
/// ```
pub struct Application {
    config: ServiceConfig,
    logger: Logger,
    network: NetworkModule,
    routes: Router,
    jwt: Option<JwtAuthLayer>,
    issuer: Option<TokenIssuer>,
}

impl Application {
    /// Builds the application against the global logger registry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or the
    /// logger cannot be built from it.
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_registry(config, LoggerRegistry::global())
    }

    /// Builds the application against `registry`, reconfiguring it from
    /// the application's log settings.
    ///
    /// # Errors
    ///
    /// See [`Application::new`].
    pub fn with_registry(
        config: ServiceConfig,
        registry: Arc<LoggerRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let logger_config = config.logger_config();
        let logger = registry.configure(logger_config.level, Some(logger_config.format));
        if config.uses_default_signing_key() {
            logger.warn("JWT is enabled with the default signing key; set TOLLGATE_JWT_SIGNING_KEY");
        }

        let trace = TraceConfig::default()
            .with_header(config.trace_header_name()?)
            .with_registry(registry);
        let network = NetworkModule::new(config.network_config(), trace);

        let (jwt, issuer) = if config.http.jwt_enabled {
            let key = config.http.jwt_signing_key.as_bytes();
            (
                Some(JwtAuthLayer::new(JwtConfig::new(key))),
                Some(TokenIssuer::new(key, config.http.jwt_token_expiration)),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            logger,
            network,
            routes: Router::new(),
            jwt,
            issuer,
        })
    }

    #[must_use]
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.routes = self.routes.route(path, method_router);
        self
    }

    #[must_use]
    pub fn merge(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    #[must_use]
    pub fn nest(mut self, prefix: &str, router: Router) -> Self {
        self.routes = self.routes.nest(prefix, router);
        self
    }

    /// Applies `layer` to every route registered so far.
    ///
    /// The built-in health routes and the trace stack are added outside it
    /// when the application runs.
    #[must_use]
    pub fn with_middleware<L>(mut self, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.routes = self.routes.layer(layer);
        self
    }

    /// Rate-limits every route registered so far, per client IP.
    ///
    /// The built-in health routes are never limited.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidQuota`] for an unusable quota.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        self.routes = rate_limited(self.routes, config)?;
        Ok(self)
    }

    /// The JWT layer for protected routes, when JWT is enabled.
    #[must_use]
    pub fn jwt(&self) -> Option<JwtAuthLayer> {
        self.jwt.clone()
    }

    /// Issues a token carrying `custom` plus a fresh `iat`/`exp` window.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Disabled`] when JWT is not enabled, or
    /// [`TokenError::Signing`] if signing fails.
    pub fn token(&self, custom: &Claims) -> Result<String, TokenError> {
        self.issuer
            .as_ref()
            .ok_or(TokenError::Disabled)?
            .issue(custom)
    }

    /// The application logger.
    #[must_use]
    pub fn log(&self) -> &Logger {
        &self.logger
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.network.shutdown_controller()
    }

    /// The complete router: application routes, built-in health routes and
    /// the HTTP middleware stack.
    #[must_use]
    pub fn router(&self) -> Router {
        self.network
            .build_router(self.routes.clone(), !self.config.http.custom_health_check)
    }

    /// Binds, serves until `shutdown` resolves, and drains.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.router();
        let mut network = self.network;
        let port = network.start().await?;

        self.logger.in_scope(|| {
            tracing::info!(
                app = %self.config.app.name,
                host = %self.config.http.host,
                port,
                jwt = self.jwt.is_some(),
                "listening"
            );
        });

        network.serve(router, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use axum::routing::get;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn config(jwt_enabled: bool) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.http.jwt_enabled = jwt_enabled;
        config.http.jwt_signing_key = "service-test-key".into();
        config
    }

    fn app(config: ServiceConfig) -> Application {
        Application::with_registry(config, Arc::new(LoggerRegistry::new())).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config(true);
        bad.http.jwt_signing_key.clear();
        let result = Application::with_registry(bad, Arc::new(LoggerRegistry::new()));
        assert!(matches!(result, Err(ConfigError::EmptySigningKey)));
    }

    #[test]
    fn registry_is_configured_from_app_settings() {
        let registry = Arc::new(LoggerRegistry::new());
        let mut config = config(false);
        config.app.log_level = -1;

        let app = Application::with_registry(config, Arc::clone(&registry)).unwrap();

        assert_eq!(registry.config(), app.config().logger_config());
        assert!(Logger::ptr_eq(app.log(), &registry.get()));
    }

    #[test]
    fn out_of_range_log_levels_still_build() {
        for level in [-10, 6, 100] {
            let registry = Arc::new(LoggerRegistry::new());
            let mut config = config(false);
            config.app.log_level = level;

            Application::with_registry(config, Arc::clone(&registry)).unwrap();

            assert_eq!(registry.config().level, level);
        }
    }

    #[tokio::test]
    async fn rate_limit_covers_application_routes_but_not_health_routes() {
        let app = app(config(false))
            .route("/ok", get(|| async { "ok" }))
            .with_rate_limit(RateLimitConfig::new(1, 1))
            .unwrap();
        let router = app.router();
        let send = |path: &'static str| {
            router.clone().oneshot(
                http::Request::builder()
                    .uri(path)
                    .header("x-forwarded-for", "192.0.2.7")
                    .body(Body::empty())
                    .unwrap(),
            )
        };

        assert_eq!(send("/ok").await.unwrap().status(), StatusCode::OK);
        let limited = send("/ok").await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key("x-request-id"));
        for _ in 0..3 {
            assert_eq!(send("/health/live").await.unwrap().status(), StatusCode::OK);
        }
    }

    #[test]
    fn jwt_helpers_follow_the_enabled_flag() {
        let disabled = app(config(false));
        assert!(disabled.jwt().is_none());
        assert!(matches!(
            disabled.token(&Claims::new()),
            Err(TokenError::Disabled)
        ));

        let enabled = app(config(true));
        assert!(enabled.jwt().is_some());
        assert!(enabled.token(&Claims::new()).is_ok());
    }

    #[tokio::test]
    async fn issued_token_opens_protected_route() {
        let app = app(config(true));
        let jwt = app.jwt().unwrap();
        let protected = Router::new()
            .route("/me", get(|| async { "me" }))
            .route_layer(jwt);
        let app = app.nest("/api", protected);

        let mut claims = Claims::new();
        claims.insert("sub".into(), json!("7"));
        let token = app.token(&claims).unwrap();
        let router = app.router();

        let denied = router
            .clone()
            .oneshot(http::Request::builder().uri("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(
                http::Request::builder()
                    .uri("/api/me")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn custom_health_check_replaces_builtin() {
        let mut config = config(false);
        config.http.custom_health_check = true;
        let app = app(config).route("/health", get(|| async { "mine" }));

        let response = app
            .router()
            .oneshot(http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b"mine");
    }

    #[tokio::test]
    async fn with_middleware_wraps_application_routes() {
        use tower_http::timeout::TimeoutLayer;

        let app = app(config(false))
            .route("/ok", get(|| async { "ok" }))
            .with_middleware(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                std::time::Duration::from_secs(1),
            ));

        let response = app
            .router()
            .oneshot(http::Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
