//! Application configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file is
//! valid apart from the CMC list.

use std::path::Path;
use std::time::Duration;

use katmon_cmc::{SubscriptionPlan, DEFAULT_CMC_PORT, DEFAULT_ENGINES_PER_HOST};
use katmon_dashboard::DashboardConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One upstream CMC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmcEndpoint {
    pub address: String,
    #[serde(default = "default_cmc_port")]
    pub port: u16,
}

fn default_cmc_port() -> u16 {
    DEFAULT_CMC_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info,katmon=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cmcs: Vec<CmcEndpoint>,
    /// Sensor subscription pattern file, one pattern per line.
    #[serde(default)]
    pub sensor_list_file: Option<String>,
    /// Inline patterns, applied after the file's.
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_array_list_poll_secs")]
    pub array_list_poll_secs: u64,
    /// Shortest gap between two dashboard snapshots.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    #[serde(default = "default_engines_per_host")]
    pub engines_per_host: usize,
    /// Times a failed request is retried before it is dropped (0 = forever).
    #[serde(default)]
    pub max_request_retries: u32,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_reconnect_interval_secs() -> u64 {
    1
}

fn default_array_list_poll_secs() -> u64 {
    60
}

fn default_publish_interval_ms() -> u64 {
    250
}

fn default_engines_per_host() -> usize {
    DEFAULT_ENGINES_PER_HOST
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cmcs: Vec::new(),
            sensor_list_file: None,
            sensors: Vec::new(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            array_list_poll_secs: default_array_list_poll_secs(),
            publish_interval_ms: default_publish_interval_ms(),
            engines_per_host: default_engines_per_host(),
            max_request_retries: 0,
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.cmcs.is_empty() {
            return Err(AppError::Config("at least one CMC is required".to_string()));
        }
        if let Some(cmc) = self.cmcs.iter().find(|c| c.address.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "CMC with port {} has an empty address",
                cmc.port
            )));
        }
        if self.reconnect_interval_secs == 0
            || self.array_list_poll_secs == 0
            || self.publish_interval_ms == 0
        {
            return Err(AppError::Config(
                "reconnect, array-list poll and publish intervals must be positive".to_string(),
            ));
        }
        if self.engines_per_host == 0 {
            return Err(AppError::Config(
                "engines_per_host must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn array_list_poll_interval(&self) -> Duration {
        Duration::from_secs(self.array_list_poll_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    /// Patterns from the sensor list file followed by the inline ones.
    pub fn subscription_plan(&self) -> AppResult<SubscriptionPlan> {
        let mut plan = match &self.sensor_list_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("Failed to read sensor list {path}: {e}"))
                })?;
                SubscriptionPlan::parse(&text, self.engines_per_host)?
            }
            None => SubscriptionPlan::new(Vec::new(), self.engines_per_host),
        };
        plan.extend_from_strs(&self.sensors)?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katmon_cmc::{CmcError, Pattern};

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [[cmcs]]
            address = "cmc1.example"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.cmcs,
            [CmcEndpoint {
                address: "cmc1.example".to_string(),
                port: 7147
            }]
        );
        assert_eq!(config.reconnect_interval(), Duration::from_secs(1));
        assert_eq!(config.array_list_poll_interval(), Duration::from_secs(60));
        assert_eq!(config.publish_interval(), Duration::from_millis(250));
        assert_eq!(config.engines_per_host, 4);
        assert_eq!(config.max_request_retries, 0);
        assert_eq!(config.telemetry.log_level, "info,katmon=debug");
        assert_eq!(config.dashboard.port, 8080);
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml(
            r#"
            sensors = ["f.spead-rx", "x.xeng.bram-reorder"]
            array_list_poll_secs = 30
            engines_per_host = 2
            max_request_retries = 5

            [[cmcs]]
            address = "cmc1"

            [[cmcs]]
            address = "cmc2"
            port = 7000

            [dashboard]
            port = 9090
            username = "ops"
            password = "secret"

            [telemetry]
            log_level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.cmcs[1].port, 7000);
        assert_eq!(config.array_list_poll_secs, 30);
        assert!(config.dashboard.auth_enabled());

        let plan = config.subscription_plan().unwrap();
        assert_eq!(plan.engines_per_host(), 2);
        assert_eq!(plan.patterns().len(), 2);
        assert!(matches!(
            &plan.patterns()[1],
            Pattern::EngineDevice { team: 'x', .. }
        ));
    }

    #[test]
    fn test_rejects_invalid_configs() {
        assert!(matches!(AppConfig::from_toml(""), Err(AppError::Config(_))));
        assert!(matches!(
            AppConfig::from_toml("[[cmcs]]\naddress = \"\"\n"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("array_list_poll_secs = 0\n[[cmcs]]\naddress = \"a\"\n"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("publish_interval_ms = 0\n[[cmcs]]\naddress = \"a\"\n"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("cmcs = 3"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_bad_inline_pattern_is_reported() {
        let config = AppConfig {
            cmcs: vec![CmcEndpoint {
                address: "cmc1".to_string(),
                port: 7147,
            }],
            sensors: vec!["a.b.c.d".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.subscription_plan(),
            Err(AppError::SensorList(CmcError::InvalidPattern { .. }))
        ));
    }

    #[test]
    fn test_missing_sensor_list_file() {
        let config = AppConfig {
            sensor_list_file: Some("/nonexistent/katmon-sensors.txt".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.subscription_plan(),
            Err(AppError::Config(_))
        ));
    }
}
