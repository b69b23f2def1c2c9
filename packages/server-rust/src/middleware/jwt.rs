//! JWT authentication middleware.
//!
//! Verifies the bearer token with [`verify_token`] and copies the non-reserved
//! claims into the request's [`RequestStore`]. Rejections short-circuit with
//! the JSON error envelope of [`AuthError`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderName;
use axum::response::{IntoResponse, Response};
use tollgate_core::claims::propagated;
use tollgate_core::RequestStore;
use tower::{Layer, Service};

use super::trace::request_logger;
use crate::auth::{extract_bearer, unix_now, verify_token, AuthError, SigningKeySource, StaticKey};

/// Decides whether a request without a token may proceed unauthenticated.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// JwtConfig
// ---------------------------------------------------------------------------

/// Settings for [`JwtAuthLayer`]. Built once per server instance.
#[derive(Clone)]
pub struct JwtConfig {
    pub key: Arc<dyn SigningKeySource>,
    pub skipper: Option<Skipper>,
    pub header: HeaderName,
}

impl JwtConfig {
    /// Verifies against a fixed signing key, reading `Authorization`.
    #[must_use]
    pub fn new(signing_key: impl AsRef<[u8]>) -> Self {
        Self::with_key_source(StaticKey::new(signing_key))
    }

    #[must_use]
    pub fn with_key_source(source: impl SigningKeySource + 'static) -> Self {
        Self {
            key: Arc::new(source),
            skipper: None,
            header: AUTHORIZATION,
        }
    }

    /// Lets tokenless requests through when `skipper` returns true.
    ///
    /// The skipper is only consulted when no token is present; a malformed or
    /// invalid token is always rejected.
    #[must_use]
    pub fn skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    #[must_use]
    pub fn header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("header", &self.header)
            .field("skipper", &self.skipper.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// JwtAuthLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JwtAuthLayer {
    config: Arc<JwtConfig>,
}

impl JwtAuthLayer {
    #[must_use]
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

// ---------------------------------------------------------------------------
// JwtAuthService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JwtAuthService<S> {
    inner: S,
    config: Arc<JwtConfig>,
}

impl<S> JwtAuthService<S> {
    /// Runs the verification steps and, on success, publishes the claims.
    ///
    /// `Ok(())` means the request may proceed, authenticated or skipped.
    fn authenticate(&self, req: &mut Request) -> Result<(), AuthError> {
        let Some(token) = extract_bearer(req.headers(), &self.config.header) else {
            return match &self.config.skipper {
                Some(skip) if skip(req) => Ok(()),
                _ => Err(AuthError::MissingToken),
            };
        };

        let claims = verify_token(token, self.config.key.as_ref(), unix_now())?;

        let extensions = req.extensions_mut();
        let mut store = extensions.remove::<RequestStore>().unwrap_or_default();
        for (name, value) in propagated(&claims) {
            store.set(name.clone(), value.clone());
        }
        extensions.insert(store);
        Ok(())
    }
}

impl<S> Service<Request> for JwtAuthService<S>
where
    S: Service<Request, Response = Response> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        match self.authenticate(&mut req) {
            Ok(()) => Box::pin(self.inner.call(req)),
            Err(err) => {
                let logger = request_logger(Some(req.extensions()));
                logger.in_scope(|| {
                    tracing::debug!(
                        reason = err.reason().as_str(),
                        code = err.code().as_str(),
                        "request rejected: {err}"
                    );
                });
                Box::pin(async move { Ok(err.into_response()) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
