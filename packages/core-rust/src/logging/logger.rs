//! Structured logger handle built on `tracing-subscriber`.
//!
//! A [`Logger`] owns its own `tracing::Dispatch` rather than relying on the
//! process-global default subscriber, so several loggers (the registry's
//! current one, a test capture, a request-scoped child) can coexist. Child
//! loggers share the parent's dispatch and add a span that carries their
//! structured fields.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Span};
use tracing_subscriber::fmt::MakeWriter;

use super::LoggingError;

/// Field name under which the trace identifier is attached to request loggers.
pub const TRACE_ID_FIELD: &str = "trace_id";

/// Severity at and below which everything is logged (`TRACE`).
pub const TRACE_LEVEL: i8 = -2;

/// Highest (fatal) severity. Any level above it disables output.
pub const FATAL_LEVEL: i8 = 5;

// ---------------------------------------------------------------------------
// LogFormat / LoggerConfig
// ---------------------------------------------------------------------------

/// Output encoding of a logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Compact human-readable lines.
    Console,
}

impl LogFormat {
    /// Returns the lowercase name used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Console => "console",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if s.eq_ignore_ascii_case("console") {
            Ok(Self::Console)
        } else {
            Err(LoggingError::UnknownFormat(s.to_string()))
        }
    }
}

/// Severity threshold and encoding a logger is built from.
///
/// Levels follow the usual signed convention where negative values are more
/// verbose: `-2` and below trace, `-1` debug, `0` info, `1` warn, `2..=5`
/// error. Anything above `5` logs nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: i8,
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: 0,
            format: LogFormat::Json,
        }
    }
}

impl LoggerConfig {
    /// Maps the signed severity onto a `tracing` level filter. Every `i8` is
    /// accepted.
    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        match self.level {
            i8::MIN..=TRACE_LEVEL => LevelFilter::TRACE,
            -1 => LevelFilter::DEBUG,
            0 => LevelFilter::INFO,
            1 => LevelFilter::WARN,
            2..=FATAL_LEVEL => LevelFilter::ERROR,
            _ => LevelFilter::OFF,
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to a structured logger.
///
/// Clones share the same underlying instance; use [`Logger::ptr_eq`] for
/// identity comparison.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    dispatch: Dispatch,
    span: Span,
    config: LoggerConfig,
    fields: Vec<(&'static str, String)>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.inner.config)
            .field("fields", &self.inner.fields)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Builds a logger writing to stderr.
    #[must_use]
    pub fn build(config: LoggerConfig) -> Self {
        Self::build_with_writer(config, io::stderr)
    }

    /// Builds a logger writing to the given `MakeWriter`.
    #[must_use]
    pub fn build_with_writer<W>(config: LoggerConfig, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self::assemble(config, config.level_filter(), writer)
    }

    /// A logger that drops everything. Handy as an override in tests.
    #[must_use]
    pub fn discard() -> Self {
        Self::assemble(LoggerConfig::default(), LevelFilter::OFF, io::sink)
    }

    fn assemble<W>(config: LoggerConfig, level: LevelFilter, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let builder = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(writer);

        let dispatch = match config.format {
            LogFormat::Json => Dispatch::new(builder.json().finish()),
            LogFormat::Console => Dispatch::new(builder.compact().finish()),
        };

        Self {
            inner: Arc::new(LoggerInner {
                dispatch,
                span: Span::none(),
                config,
                fields: Vec::new(),
            }),
        }
    }

    /// Returns a child logger whose events carry `trace_id` as a structured field.
    #[must_use]
    pub fn with_trace_id(&self, trace_id: &str) -> Self {
        // ERROR keeps the span enabled at every severity the logger emits.
        let span = tracing::dispatcher::with_default(&self.inner.dispatch, || {
            tracing::error_span!(parent: &self.inner.span, "request", trace_id = %trace_id)
        });

        let mut fields = self.inner.fields.clone();
        fields.push((TRACE_ID_FIELD, trace_id.to_string()));

        Self {
            inner: Arc::new(LoggerInner {
                dispatch: self.inner.dispatch.clone(),
                span,
                config: self.inner.config,
                fields,
            }),
        }
    }

    /// Returns the value of a structured field attached to this logger.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .rev()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Configuration this logger (or its root) was built from.
    #[must_use]
    pub fn config(&self) -> LoggerConfig {
        self.inner.config
    }

    /// The dispatch events are routed to.
    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.inner.dispatch
    }

    /// Identity comparison: true when both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Runs `f` with this logger's dispatch as the default and its span entered.
    ///
    /// Any `tracing` macro invoked inside `f` is recorded by this logger and
    /// inherits its structured fields.
    pub fn in_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        tracing::dispatcher::with_default(&self.inner.dispatch, || self.inner.span.in_scope(f))
    }

    pub fn trace(&self, message: &str) {
        self.in_scope(|| tracing::trace!("{message}"));
    }

    pub fn debug(&self, message: &str) {
        self.in_scope(|| tracing::debug!("{message}"));
    }

    pub fn info(&self, message: &str) {
        self.in_scope(|| tracing::info!("{message}"));
    }

    pub fn warn(&self, message: &str) {
        self.in_scope(|| tracing::warn!("{message}"));
    }

    pub fn error(&self, message: &str) {
        self.in_scope(|| tracing::error!("{message}"));
    }
}
