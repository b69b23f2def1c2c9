//! HTTP handlers served by the network module.
//!
//! Defines `AppState`, the state carried through axum extractors to the
//! built-in endpoints.

pub mod claims;
pub mod health;

pub use claims::claims_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;

/// Shared state for the built-in endpoints. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub shutdown: Arc<ShutdownController>,
    /// Used for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(shutdown: Arc<ShutdownController>) -> Self {
        Self {
            shutdown,
            start_time: Instant::now(),
        }
    }
}
