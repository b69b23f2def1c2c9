//! Structured logging: logger handles and the process-wide registry.
//!
//! - [`logger`]: `Logger`, `LoggerConfig`, `LogFormat`
//! - [`registry`]: `LoggerRegistry` with lazy build and reconfiguration
//! - [`testing`]: in-memory capture for asserting on log output
//!
//! The free functions below operate on [`LoggerRegistry::global`].

pub mod logger;
pub mod registry;
pub mod testing;

pub use logger::{LogFormat, Logger, LoggerConfig, FATAL_LEVEL, TRACE_ID_FIELD, TRACE_LEVEL};
pub use registry::LoggerRegistry;

/// Errors raised while reading logging settings.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log format {0:?}, expected \"json\" or \"console\"")]
    UnknownFormat(String),
}

/// Returns the global logger, building it on first use.
#[must_use]
pub fn get() -> Logger {
    LoggerRegistry::global().get()
}

/// Reconfigures the global logger. See [`LoggerRegistry::configure`].
pub fn configure(level: i8, format: Option<LogFormat>) -> Logger {
    LoggerRegistry::global().configure(level, format)
}

/// Clears the global logger. Intended for tests only.
pub fn reset_for_tests() {
    LoggerRegistry::global().reset_for_tests();
}

/// Replaces the global logger. Intended for tests only.
pub fn override_for_tests(logger: Logger) {
    LoggerRegistry::global().override_for_tests(logger);
}
