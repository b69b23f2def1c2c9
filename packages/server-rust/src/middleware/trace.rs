//! Trace-id middleware.
//!
//! Resolves the request's trace id from an inbound header or generates one,
//! derives a request logger carrying it, publishes both into the request
//! extensions and echoes the id on the response.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue};
use rand::rngs::OsRng;
use rand::TryRngCore;
use tollgate_core::{logger_for, Logger, LoggerRegistry, RequestContext, RequestStore};
use tower::{Layer, Service};

/// Header read and written when none is configured.
pub const DEFAULT_TRACE_HEADER: &str = "x-request-id";

/// `RequestStore` key holding the request [`Logger`].
pub const REQUEST_LOGGER_KEY: &str = "request_logger";

/// Bytes of OS entropy behind a generated trace id.
const TRACE_ID_BYTES: usize = 16;

/// Produces a fresh trace id. An empty string signals failure.
pub type TraceIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// TraceConfig
// ---------------------------------------------------------------------------

/// Settings for [`TraceIdLayer`].
#[derive(Clone)]
pub struct TraceConfig {
    pub header: HeaderName,
    pub generator: TraceIdGenerator,
    pub registry: Arc<LoggerRegistry>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_TRACE_HEADER),
            generator: Arc::new(random_trace_id),
            registry: LoggerRegistry::global(),
        }
    }
}

impl TraceConfig {
    #[must_use]
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Derives request loggers from `registry` instead of the global one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<LoggerRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

impl fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceConfig")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Trace id resolution
// ---------------------------------------------------------------------------

/// Returns the inbound trace id, or a freshly generated one.
///
/// An empty or non-text header counts as absent. A generated id that is empty
/// or cannot be sent back as a header value is replaced by
/// [`fallback_trace_id`], so the result is never empty.
#[must_use]
pub fn resolve_trace_id(config: &TraceConfig, headers: &HeaderMap) -> String {
    let inbound = headers
        .get(&config.header)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty());
    if let Some(id) = inbound {
        return id.to_string();
    }

    let generated = (config.generator)();
    if generated.is_empty() || HeaderValue::from_str(&generated).is_err() {
        return fallback_trace_id();
    }
    generated
}

/// 16 bytes of OS entropy, hex encoded. Returns `""` if the OS RNG fails.
#[must_use]
pub fn random_trace_id() -> String {
    let mut bytes = [0_u8; TRACE_ID_BYTES];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read entropy for trace id");
            String::new()
        }
    }
}

/// Deterministic id of the form `<unix nanos>-<pid>`.
#[must_use]
pub fn fallback_trace_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    format!("{nanos}-{}", std::process::id())
}

// ---------------------------------------------------------------------------
// Request logger lookup
// ---------------------------------------------------------------------------

/// Returns the logger for a request, looking in the request store, then the
/// request context, then falling back to the registry logger.
///
/// The registry is the one [`TraceIdLayer`] published into the extensions, or
/// the global registry when the request never passed through it.
#[must_use]
pub fn request_logger(extensions: Option<&Extensions>) -> Logger {
    let registry = extensions
        .and_then(|extensions| extensions.get::<Arc<LoggerRegistry>>())
        .cloned()
        .unwrap_or_else(LoggerRegistry::global);
    request_logger_in(&registry, extensions)
}

/// [`request_logger`] against an explicit registry.
#[must_use]
pub fn request_logger_in(registry: &LoggerRegistry, extensions: Option<&Extensions>) -> Logger {
    let Some(extensions) = extensions else {
        return registry.get();
    };

    let stored = extensions
        .get::<RequestStore>()
        .and_then(|store| store.get::<Logger>(REQUEST_LOGGER_KEY));
    if let Some(logger) = stored {
        return logger.clone();
    }

    logger_for(registry, extensions.get::<RequestContext>())
}

/// Extractor for the request logger.
///
/// ```ignore
/// async fn handler(RequestLogger(log): RequestLogger) {
///     log.info("handling");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestLogger(pub Logger);

impl<S: Send + Sync> FromRequestParts<S> for RequestLogger {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(request_logger(Some(&parts.extensions))))
    }
}

// ---------------------------------------------------------------------------
// TraceIdLayer
// ---------------------------------------------------------------------------

/// Tower layer attaching a trace id and request logger to every request.
#[derive(Debug, Clone)]
pub struct TraceIdLayer {
    config: Arc<TraceConfig>,
}

impl TraceIdLayer {
    #[must_use]
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for TraceIdLayer {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

// ---------------------------------------------------------------------------
// TraceIdService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TraceIdService<S> {
    inner: S,
    config: Arc<TraceConfig>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for TraceIdService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        let trace_id = resolve_trace_id(&self.config, req.headers());

        let ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default()
            .with_trace_id(&trace_id);
        let logger = logger_for(&self.config.registry, Some(&ctx));
        let ctx = ctx.with_logger(Some(&logger));

        let extensions = req.extensions_mut();
        let mut store = extensions.remove::<RequestStore>().unwrap_or_default();
        store.set(REQUEST_LOGGER_KEY, logger);
        extensions.insert(store);
        extensions.insert(ctx);
        extensions.insert(Arc::clone(&self.config.registry));

        let header = self.config.header.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let mut response = fut.await?;
            if let Ok(value) = HeaderValue::from_str(&trace_id) {
                response.headers_mut().insert(header, value);
            }
            Ok(response)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use tollgate_core::logging::testing::CapturedLogs;
    use tollgate_core::logging::TRACE_ID_FIELD;
    use tollgate_core::LoggerConfig;
    use tower::ServiceExt;

    use super::*;

    fn isolated(generator: impl Fn() -> String + Send + Sync + 'static) -> TraceConfig {
        TraceConfig::default()
            .with_generator(generator)
            .with_registry(Arc::new(LoggerRegistry::new()))
    }

    /// Inner service that records what the middleware published.
    #[derive(Clone)]
    struct EchoService;

    impl Service<Request<Body>> for EchoService {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Infallible>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let ctx_id = req
                .extensions()
                .get::<RequestContext>()
                .and_then(|ctx| ctx.trace_id().map(str::to_string))
                .unwrap_or_default();
            let logger_id = req
                .extensions()
                .get::<RequestStore>()
                .and_then(|store| store.get::<Logger>(REQUEST_LOGGER_KEY))
                .and_then(|logger| logger.field(TRACE_ID_FIELD).map(str::to_string))
                .unwrap_or_default();
            Box::pin(async move {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("x-ctx-id", ctx_id)
                    .header("x-logger-id", logger_id)
                    .body(Body::empty())
                    .unwrap())
            })
        }
    }

    #[test]
    fn random_trace_id_is_32_hex_chars() {
        let id = random_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_trace_id());
    }

    #[test]
    fn fallback_trace_id_ends_with_pid() {
        let id = fallback_trace_id();
        let (nanos, pid) = id.rsplit_once('-').unwrap();
        assert!(nanos.parse::<u128>().is_ok());
        assert_eq!(pid, std::process::id().to_string());
    }

    #[test]
    fn inbound_header_wins_over_generator() {
        let config = isolated(|| "generated".into());
        let mut headers = HeaderMap::new();
        headers.insert(DEFAULT_TRACE_HEADER, HeaderValue::from_static("inbound"));

        assert_eq!(resolve_trace_id(&config, &headers), "inbound");
    }

    #[test]
    fn empty_inbound_header_is_absent() {
        let config = isolated(|| "generated".into());
        let mut headers = HeaderMap::new();
        headers.insert(DEFAULT_TRACE_HEADER, HeaderValue::from_static(""));

        assert_eq!(resolve_trace_id(&config, &headers), "generated");
    }

    #[test]
    fn failed_or_illegal_generation_falls_back() {
        for generated in ["", "bad\nvalue"] {
            let config = isolated(move || generated.to_string());
            let id = resolve_trace_id(&config, &HeaderMap::new());
            assert!(id.contains('-'), "{generated:?} -> {id}");
            assert!(!id.is_empty());
        }
    }

    #[tokio::test]
    async fn publishes_context_store_and_response_header() {
        let svc = TraceIdLayer::new(isolated(|| "generated-trace".into())).layer(EchoService);

        let response = svc
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[DEFAULT_TRACE_HEADER], "generated-trace");
        assert_eq!(headers["x-ctx-id"], "generated-trace");
        assert_eq!(headers["x-logger-id"], "generated-trace");
    }

    #[tokio::test]
    async fn custom_header_name_is_used_both_ways() {
        let header = HeaderName::from_static("x-trace");
        let config = isolated(|| "unused".into()).with_header(header.clone());
        let svc = TraceIdLayer::new(config).layer(EchoService);

        let req = Request::builder()
            .header("x-trace", "abc")
            .body(Body::empty())
            .unwrap();
        let response = svc.oneshot(req).await.unwrap();

        assert_eq!(response.headers()["x-trace"], "abc");
        assert!(response.headers().get(DEFAULT_TRACE_HEADER).is_none());
    }

    #[tokio::test]
    async fn upstream_logger_is_reused() {
        let logs = CapturedLogs::new();
        let upstream = logs.logger(LoggerConfig::default());
        let svc = TraceIdLayer::new(isolated(|| "t-1".into())).layer(EchoService);

        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(RequestContext::new().with_logger(Some(&upstream)));
        let response = svc.oneshot(req).await.unwrap();

        assert_eq!(response.headers()["x-ctx-id"], "t-1");
        // The upstream logger carries no trace field of its own.
        assert_eq!(response.headers()["x-logger-id"], "");
    }

    #[test]
    fn request_logger_falls_back_through_store_context_registry() {
        let registry = LoggerRegistry::new();
        let global = registry.get();
        assert!(Logger::ptr_eq(&request_logger_in(&registry, None), &global));

        let mut extensions = Extensions::new();
        extensions.insert(RequestContext::new().with_trace_id("from-ctx"));
        let from_ctx = request_logger_in(&registry, Some(&extensions));
        assert_eq!(from_ctx.field(TRACE_ID_FIELD), Some("from-ctx"));

        let stored = Logger::discard();
        let mut store = RequestStore::new();
        store.set(REQUEST_LOGGER_KEY, stored.clone());
        extensions.insert(store);
        assert!(Logger::ptr_eq(
            &request_logger_in(&registry, Some(&extensions)),
            &stored
        ));
    }

    #[test]
    fn request_logger_uses_the_published_registry() {
        let logs = CapturedLogs::new();
        let registry = Arc::new(LoggerRegistry::new());
        registry.override_for_tests(logs.logger(LoggerConfig::default()));

        let mut extensions = Extensions::new();
        extensions.insert(Arc::clone(&registry));
        extensions.insert(RequestContext::new().with_trace_id("published"));
        let logger = request_logger(Some(&extensions));
        logger.info("routed to the layer's registry");

        assert_eq!(logger.field(TRACE_ID_FIELD), Some("published"));
        assert!(logs.contents().contains("routed to the layer's registry"));
    }

    #[test]
    fn mistyped_store_entry_is_ignored() {
        let registry = LoggerRegistry::new();
        let mut store = RequestStore::new();
        store.set(REQUEST_LOGGER_KEY, "not a logger".to_string());
        let mut extensions = Extensions::new();
        extensions.insert(store);

        let logger = request_logger_in(&registry, Some(&extensions));

        assert!(Logger::ptr_eq(&logger, &registry.get()));
    }
}
