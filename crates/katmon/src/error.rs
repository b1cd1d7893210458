//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sensor list error: {0}")]
    SensorList(#[from] katmon_cmc::CmcError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] katmon_telemetry::TelemetryError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] katmon_dashboard::DashboardError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
