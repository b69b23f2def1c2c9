//! `Tollgate` Server: HTTP service scaffold with trace-id propagation, JWT
//! authentication, rate limiting, and health checks.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod network;
pub mod service;

pub use auth::{AuthError, TokenError, TokenIssuer};
pub use config::{ConfigError, ServiceConfig};
pub use middleware::{
    JwtAuthLayer, JwtConfig, RateLimitConfig, RequestLogger, TraceConfig, TraceIdLayer,
};
pub use network::{NetworkModule, ShutdownController};
pub use service::Application;
