//! Process-wide logger registry.
//!
//! The registry owns the single live [`Logger`] and the configuration it was
//! built from. `get()` takes the read lock on the hot path and only falls
//! back to the write lock for the one-time lazy build; `configure()` rebuilds
//! under the write lock, so readers never observe a half-built logger.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::{LogFormat, Logger, LoggerConfig};

static GLOBAL: LazyLock<Arc<LoggerRegistry>> = LazyLock::new(|| Arc::new(LoggerRegistry::new()));

#[derive(Debug, Default)]
struct RegistryState {
    current: Option<Logger>,
    config: LoggerConfig,
}

/// Holds the current logger and its cached configuration.
#[derive(Debug, Default)]
pub struct LoggerRegistry {
    state: RwLock<RegistryState>,
}

impl LoggerRegistry {
    /// Creates an empty registry with the default configuration (info, json).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Built lazily on first access and never torn
    /// down, except through [`LoggerRegistry::reset_for_tests`].
    #[must_use]
    pub fn global() -> Arc<LoggerRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Returns the current logger, building it from the cached configuration
    /// if none exists yet.
    pub fn get(&self) -> Logger {
        if let Some(current) = &self.state.read().current {
            return current.clone();
        }

        let mut state = self.state.write();
        if let Some(current) = &state.current {
            return current.clone();
        }

        let logger = Logger::build(state.config);
        state.current = Some(logger.clone());
        logger
    }

    /// Rebuilds the logger with a new severity and, optionally, a new format.
    ///
    /// `None` keeps the previously cached format. The new logger replaces the
    /// shared instance and is returned. Concurrent calls are serialised, so the
    /// cached configuration always matches the current instance.
    pub fn configure(&self, level: i8, format: Option<LogFormat>) -> Logger {
        let mut state = self.state.write();
        let config = LoggerConfig {
            level,
            format: format.unwrap_or(state.config.format),
        };

        let logger = Logger::build(config);
        state.config = config;
        state.current = Some(logger.clone());

        tracing::debug!(severity = level, format = %config.format, "logger reconfigured");
        logger
    }

    /// The configuration the next lazily built logger will use.
    #[must_use]
    pub fn config(&self) -> LoggerConfig {
        self.state.read().config
    }

    /// Whether a logger has been built or installed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().current.is_some()
    }

    /// Drops the current logger and restores the default configuration.
    /// Intended for tests only.
    pub fn reset_for_tests(&self) {
        let mut state = self.state.write();
        state.current = None;
        state.config = LoggerConfig::default();
    }

    /// Installs `logger` as the current instance without touching the cached
    /// configuration. Intended for tests only.
    pub fn override_for_tests(&self, logger: Logger) {
        self.state.write().current = Some(logger);
    }
}
