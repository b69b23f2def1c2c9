//! Per-client rate limiting.
//!
//! A token bucket per client IP, backed by `tower_governor`. The client is
//! identified from `X-Forwarded-For`, `X-Real-IP` or `Forwarded`, falling back
//! to the peer address, so the server must be run with connect info (as
//! [`NetworkModule::serve`](crate::network::NetworkModule::serve) does).
//! Requests over the quota are answered with `429 Too Many Requests`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;

/// Steady request rate and burst allowance for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests replenished per second.
    pub per_second: u32,
    /// Requests a client may send back to back. `0` means `per_second`.
    pub burst: u32,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(per_second: u32, burst: u32) -> Self {
        Self { per_second, burst }
    }

    /// Interval after which one request of the quota is replenished.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(1)
            .checked_div(self.per_second)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn burst_size(&self) -> u32 {
        if self.burst == 0 {
            self.per_second
        } else {
            self.burst
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit of {per_second}/s with burst {burst} is not a usable quota")]
    InvalidQuota { per_second: u32, burst: u32 },
}

/// Applies the rate limit to every route of `router`.
///
/// All routes share one bucket per client.
///
/// # Errors
///
/// Returns [`RateLimitError::InvalidQuota`] when the rate is zero or too high
/// to express as a replenish interval.
pub fn rate_limited(router: Router, config: RateLimitConfig) -> Result<Router, RateLimitError> {
    let invalid = || RateLimitError::InvalidQuota {
        per_second: config.per_second,
        burst: config.burst,
    };
    if config.period().is_zero() {
        return Err(invalid());
    }

    // TODO: evict idle client buckets periodically with `limiter().retain_recent()`.
    let governor = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .period(config.period())
        .burst_size(config.burst_size())
        .finish()
        .ok_or_else(invalid)?;

    Ok(router.layer(GovernorLayer {
        config: Arc::new(governor),
    }))
}
