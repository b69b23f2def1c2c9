//! Immutable per-request context carrying the trace identifier and request logger.
//!
//! Derivation never mutates: every `with_*` call consumes the context and
//! returns the (possibly unchanged) derived value, so clones taken earlier keep
//! what they had.

use std::sync::Arc;

use crate::logging::{Logger, LoggerRegistry};

/// Per-request context threaded through the middleware chain via request extensions.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    trace_id: Option<Arc<str>>,
    logger: Option<Logger>,
}

impl RequestContext {
    /// An empty context: no trace id, no logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context carrying `trace_id`. An empty id leaves `self` unchanged.
    #[must_use]
    pub fn with_trace_id(self, trace_id: &str) -> Self {
        if trace_id.is_empty() {
            return self;
        }
        Self {
            trace_id: Some(Arc::from(trace_id)),
            ..self
        }
    }

    /// The stored trace id, if present and non-empty.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns a context carrying `logger`. `None` leaves `self` unchanged.
    #[must_use]
    pub fn with_logger(self, logger: Option<&Logger>) -> Self {
        match logger {
            Some(logger) => Self {
                logger: Some(logger.clone()),
                ..self
            },
            None => self,
        }
    }

    /// The logger attached by an upstream layer, if any.
    #[must_use]
    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }
}

/// Resolves the logger to use for `ctx`.
///
/// An explicitly attached logger wins. Otherwise the registry's current logger
/// is used, enriched with the context's trace id when there is one. A missing
/// context yields the registry logger as is.
#[must_use]
pub fn logger_for(registry: &LoggerRegistry, ctx: Option<&RequestContext>) -> Logger {
    let Some(ctx) = ctx else {
        return registry.get();
    };

    if let Some(logger) = ctx.logger() {
        return logger.clone();
    }

    let logger = registry.get();
    match ctx.trace_id() {
        Some(trace_id) => logger.with_trace_id(trace_id),
        None => logger,
    }
}
