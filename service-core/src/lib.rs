//! service-core: shared infrastructure for taskhive services.
pub mod breaker;
pub mod config;
pub mod error;
pub mod observability;

pub use breaker::{BreakerConfig, BreakerError, CircuitBreaker, CircuitState};
pub use error::AppError;

pub use serde;
pub use tokio;
pub use tracing;
