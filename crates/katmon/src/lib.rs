//! katmon - KATCP telemetry aggregator.
//!
//! Orchestrates the workspace:
//! - one [`katmon_cmc::CmcServer`] per configured CMC, driven by a single
//!   event-loop task
//! - snapshot publication to the read-only dashboard
//! - channel and array gauges

pub mod app;
pub mod config;
pub mod error;

pub use app::Monitor;
pub use config::{AppConfig, CmcEndpoint, TelemetryConfig};
pub use error::{AppError, AppResult};
