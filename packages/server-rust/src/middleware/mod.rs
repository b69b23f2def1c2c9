//! HTTP middleware: trace-id propagation, JWT authentication, rate limiting,
//! and the transport-level layer stack applied to every request.
//!
//! Middleware ordering follows the outer-to-inner convention: the first layer
//! listed is the outermost (sees the request first on the way in and the
//! response last on the way out).

pub mod jwt;
pub mod rate_limit;
pub mod trace;

use std::any::Any;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tower::layer::util::{Identity, Stack};
use tower::{Layer, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use jwt::{JwtAuthLayer, JwtAuthService, JwtConfig, Skipper};
pub use rate_limit::{rate_limited, RateLimitConfig, RateLimitError};
pub use trace::{
    request_logger, RequestLogger, TraceConfig, TraceIdGenerator, TraceIdLayer, TraceIdService,
    DEFAULT_TRACE_HEADER, REQUEST_LOGGER_KEY,
};

use crate::network::NetworkConfig;

/// Turns a caught panic into the response sent to the client.
pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response<Body>;

/// The composed layer type produced by [`build_http_layers`], outermost last.
pub type HttpLayers = Stack<
    TimeoutLayer,
    Stack<
        TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
        Stack<CatchPanicLayer<PanicHandler>, Stack<TraceIdLayer, Identity>>,
    >,
>;

/// Builds the HTTP middleware stack.
///
/// **Ordering (outermost to innermost):**
/// 1. `TraceId` -- resolves the trace id, publishes the request logger, echoes
///    the id on every response including timeouts, panics and auth rejections
/// 2. `CatchPanic` -- turns a panicking handler into a `500`
/// 3. `Tracing` -- access log with structured request/response spans
/// 4. `Timeout` -- answers `408` once `request_timeout` elapses
///
/// JWT authentication is route-level and applied by the application to the
/// routes it protects, inside this stack.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, trace: TraceConfig) -> HttpLayers {
    ServiceBuilder::new()
        .layer(TraceIdLayer::new(trace))
        .layer(CatchPanicLayer::custom(panic_response as PanicHandler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    tracing::error!(panic = detail, "request handler panicked");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Strips trailing slashes before routing, so `/health/` reaches `/health`.
///
/// Must wrap the whole router: a layer added with `Router::layer` runs after
/// the route has already been matched.
#[must_use]
pub fn trim_trailing_slash(router: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tollgate_core::LoggerRegistry;
    use tower::ServiceExt;

    use super::*;

    fn trace_config() -> TraceConfig {
        TraceConfig::default()
            .with_generator(|| "layer-test".into())
            .with_registry(Arc::new(LoggerRegistry::new()))
    }

    #[tokio::test]
    async fn layers_echo_trace_id() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(build_http_layers(&NetworkConfig::default(), trace_config()));

        let response = router
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[DEFAULT_TRACE_HEADER], "layer-test");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out_with_trace_header() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(50),
            ..NetworkConfig::default()
        };
        let router = Router::new()
            .route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(build_http_layers(&config, trace_config()));

        let response = router
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()[DEFAULT_TRACE_HEADER], "layer-test");
    }

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_500_with_trace_header() {
        let router = Router::new()
            .route("/", get(explode))
            .layer(build_http_layers(&NetworkConfig::default(), trace_config()));

        let response = tokio::spawn(router.oneshot(Request::new(Body::empty())))
            .await
            .expect("panic must not escape the layer stack")
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[DEFAULT_TRACE_HEADER], "layer-test");
    }

    #[tokio::test]
    async fn trailing_slash_is_trimmed_before_routing() {
        let router = Router::new()
            .route("/health/live", get(|| async { "alive" }))
            .layer(build_http_layers(&NetworkConfig::default(), trace_config()));
        let service = trim_trailing_slash(router);

        let req = Request::builder()
            .uri("/health/live/")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[DEFAULT_TRACE_HEADER], "layer-test");
    }
}
