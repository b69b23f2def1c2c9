//! Service configuration, parsed from command-line flags and `TOLLGATE_*`
//! environment variables.

use std::time::Duration;

use axum::http::HeaderName;
use clap::{Args, Parser};
use tollgate_core::{LogFormat, LoggerConfig};

use crate::middleware::{RateLimitConfig, DEFAULT_TRACE_HEADER};
use crate::network::NetworkConfig;

/// Signing key used when none is configured. Only fit for development.
pub const DEFAULT_SIGNING_KEY: &str = "default-signing-key";

const DEFAULT_APP_NAME: &str = "MyApp";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TOKEN_EXPIRATION: Duration = Duration::from_secs(48 * 60 * 60);

/// Errors found while parsing or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?}, expected e.g. \"250ms\", \"30s\", \"5m\", \"48h\" or bare seconds")]
    InvalidDuration(String),
    #[error("JWT is enabled but the signing key is empty")]
    EmptySigningKey,
    #[error("JWT token expiration must be greater than zero")]
    ZeroTokenExpiration,
    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,
    #[error("trace header {0:?} is not a valid header name")]
    InvalidTraceHeader(String),
}

/// Parses `250ms`, `30s`, `5m`, `48h`, or a bare number of seconds.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for anything else.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(raw.to_string());
    let s = raw.trim();

    // Unit in milliseconds.
    let (digits, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

// ---------------------------------------------------------------------------
// Configuration groups
// ---------------------------------------------------------------------------

/// Application identity and logging.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Application name, reported at startup.
    #[arg(long = "app-name", env = "TOLLGATE_APP_NAME", default_value = DEFAULT_APP_NAME)]
    pub name: String,

    /// Log severity: -2 trace, -1 debug, 0 info, 1 warn, 2..5 error, above 5 off.
    #[arg(
        long,
        env = "TOLLGATE_LOG_LEVEL",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub log_level: i8,

    /// Log encoding: `json` or `console`.
    #[arg(long, env = "TOLLGATE_LOG_FORMAT", default_value = "console")]
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_string(),
            log_level: 0,
            log_format: LogFormat::Console,
        }
    }
}

/// HTTP transport, authentication, and tracing.
#[derive(Debug, Clone, Args)]
pub struct HttpConfig {
    #[arg(long = "http-host", env = "TOLLGATE_HTTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long = "http-port", env = "TOLLGATE_HTTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum time a request may take.
    #[arg(
        long = "http-request-timeout",
        env = "TOLLGATE_HTTP_REQUEST_TIMEOUT",
        default_value = "10s",
        value_parser = parse_duration
    )]
    pub request_timeout: Duration,

    /// Enables JWT-protected routes and token issuance.
    #[arg(long, env = "TOLLGATE_JWT_ENABLED")]
    pub jwt_enabled: bool,

    /// HMAC secret for signing and verifying tokens.
    #[arg(
        long,
        env = "TOLLGATE_JWT_SIGNING_KEY",
        default_value = DEFAULT_SIGNING_KEY,
        hide_env_values = true
    )]
    pub jwt_signing_key: String,

    /// Lifetime of issued tokens.
    #[arg(
        long = "jwt-expiration",
        env = "TOLLGATE_JWT_EXPIRATION",
        default_value = "48h",
        value_parser = parse_duration
    )]
    pub jwt_token_expiration: Duration,

    /// Header carrying the trace id in both directions.
    #[arg(long, env = "TOLLGATE_TRACE_HEADER", default_value = DEFAULT_TRACE_HEADER)]
    pub trace_header: String,

    /// Leaves `GET /health` for the application to register.
    #[arg(long, env = "TOLLGATE_CUSTOM_HEALTH_CHECK")]
    pub custom_health_check: bool,

    /// Requests per second allowed per client IP. `0` disables rate limiting.
    #[arg(long = "rate-limit", env = "TOLLGATE_RATE_LIMIT", default_value_t = 0)]
    pub rate_limit: u32,

    /// Requests a client may send at once. `0` means the same as the rate.
    #[arg(long = "rate-limit-burst", env = "TOLLGATE_RATE_LIMIT_BURST", default_value_t = 0)]
    pub rate_limit_burst: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            jwt_enabled: false,
            jwt_signing_key: DEFAULT_SIGNING_KEY.to_string(),
            jwt_token_expiration: DEFAULT_TOKEN_EXPIRATION,
            trace_header: DEFAULT_TRACE_HEADER.to_string(),
            custom_health_check: false,
            rate_limit: 0,
            rate_limit_burst: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Complete configuration of a service instance.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tollgate", version, about = "HTTP service with trace-id and JWT middleware")]
pub struct ServiceConfig {
    #[command(flatten)]
    pub app: AppConfig,

    #[command(flatten)]
    pub http: HttpConfig,
}

impl ServiceConfig {
    /// Checks cross-field constraints clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trace_header_name()?;

        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        if self.http.jwt_enabled {
            if self.http.jwt_signing_key.is_empty() {
                return Err(ConfigError::EmptySigningKey);
            }
            if self.http.jwt_token_expiration.is_zero() {
                return Err(ConfigError::ZeroTokenExpiration);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            level: self.app.log_level,
            format: self.app.log_format,
        }
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.http.host.clone(),
            port: self.http.port,
            request_timeout: self.http.request_timeout,
        }
    }

    /// The configured trace header, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTraceHeader`] if it is not a legal name.
    pub fn trace_header_name(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::from_bytes(self.http.trace_header.to_ascii_lowercase().as_bytes())
            .map_err(|_| ConfigError::InvalidTraceHeader(self.http.trace_header.clone()))
    }

    /// Per-client rate limit, when one is configured.
    #[must_use]
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        (self.http.rate_limit > 0)
            .then(|| RateLimitConfig::new(self.http.rate_limit, self.http.rate_limit_burst))
    }

    /// True when JWT is on and still signed with [`DEFAULT_SIGNING_KEY`].
    #[must_use]
    pub fn uses_default_signing_key(&self) -> bool {
        self.http.jwt_enabled && self.http.jwt_signing_key == DEFAULT_SIGNING_KEY
    }
}
