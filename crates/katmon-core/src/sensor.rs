//! Sensor leaf and status vocabulary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// KATCP sensor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Nominal,
    Warn,
    Error,
    Failure,
    Unknown,
    Unreachable,
    Inactive,
}

impl SensorStatus {
    /// Parse the status word used on the wire.
    ///
    /// Returns `None` for anything outside the KATCP vocabulary.
    pub fn from_wire(word: &str) -> Option<Self> {
        match word {
            "nominal" => Some(Self::Nominal),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "failure" => Some(Self::Failure),
            "unknown" => Some(Self::Unknown),
            "unreachable" => Some(Self::Unreachable),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Failure => "failure",
            Self::Unknown => "unknown",
            Self::Unreachable => "unreachable",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single subscribed sensor.
///
/// Value and status are kept as the strings received from the wire; the
/// status can be interpreted on demand with [`Sensor::status_kind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sensor {
    name: String,
    value: String,
    status: String,
    updated_at: Option<DateTime<Utc>>,
}

impl Sensor {
    /// Create a sensor that has not reported yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            status: SensorStatus::Unknown.as_str().to_string(),
            updated_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Status parsed into the KATCP vocabulary, if it is part of it.
    pub fn status_kind(&self) -> Option<SensorStatus> {
        SensorStatus::from_wire(&self.status)
    }

    /// Time of the last update, `None` until the first one arrives.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Store a new reading and stamp it with the current time.
    pub fn update(&mut self, value: &str, status: &str) {
        value.clone_into(&mut self.value);
        status.clone_into(&mut self.status);
        self.updated_at = Some(Utc::now());
    }
}

/// Find a sensor by name in a flat list.
pub(crate) fn find_sensor<'a>(sensors: &'a [Sensor], name: &str) -> Option<&'a Sensor> {
    sensors.iter().find(|s| s.name == name)
}

/// Find a sensor by name, appending a fresh one if it does not exist yet.
pub(crate) fn ensure_sensor<'a>(sensors: &'a mut Vec<Sensor>, name: &str) -> &'a mut Sensor {
    let index = match sensors.iter().position(|s| s.name == name) {
        Some(index) => index,
        None => {
            sensors.push(Sensor::new(name));
            sensors.len() - 1
        }
    };
    &mut sensors[index]
}
