//! Prometheus metrics and structured logging for katmon.
//!
//! - Prometheus metrics for channel states, informs, array discovery
//! - Structured logging with tracing (JSON in production)
//! - Text exposition for the dashboard's `/metrics` route

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
