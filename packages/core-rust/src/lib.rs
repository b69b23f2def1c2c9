//! `Tollgate` Core: logger registry, trace context, request-local store, and JWT claims.

pub mod claims;
pub mod context;
pub mod logging;
pub mod store;

pub use claims::{Claims, ClaimsError};
pub use context::{logger_for, RequestContext};
pub use logging::{LogFormat, Logger, LoggerConfig, LoggerRegistry, LoggingError};
pub use store::RequestStore;
