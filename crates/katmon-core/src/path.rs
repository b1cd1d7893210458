//! Routing of dotted sensor names onto the sensor tree.
//!
//! ```text
//! device-status                         -> array-level sensor
//! fhost07.spead-rx.device-status        -> team f, host 7, device, sensor
//! xhost03.xeng2.vacc.device-status      -> team x, host 3, engine, device, sensor
//! ```

use crate::error::{ModelError, ModelResult};
use crate::host::HostId;

/// A sensor name resolved to its place in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPath<'a> {
    /// Top-level array sensor.
    Array { sensor: &'a str },
    /// Sensor on a host device.
    Host {
        host: HostId,
        device: &'a str,
        sensor: &'a str,
    },
    /// Sensor on a device of one of a host's engines.
    Engine {
        host: HostId,
        engine: &'a str,
        device: &'a str,
        sensor: &'a str,
    },
}

impl<'a> SensorPath<'a> {
    /// Parse a full sensor name.
    ///
    /// Names with 2 or more than 4 segments, empty segments, or a first
    /// segment that is not `{team}host{NN}` are rejected.
    pub fn parse(name: &'a str) -> ModelResult<Self> {
        let malformed = || ModelError::MalformedSensorName(name.to_string());
        let tokens: Vec<&str> = name.split('.').collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(malformed());
        }

        match *tokens.as_slice() {
            [sensor] => Ok(Self::Array { sensor }),
            [host, device, sensor] => Ok(Self::Host {
                host: HostId::parse(host).ok_or_else(malformed)?,
                device,
                sensor,
            }),
            [host, engine, device, sensor] => Ok(Self::Engine {
                host: HostId::parse(host).ok_or_else(malformed)?,
                engine,
                device,
                sensor,
            }),
            _ => Err(malformed()),
        }
    }
}
