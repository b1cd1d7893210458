//! Hosts: processing nodes owning devices, engines and vdevices.

use serde::Serialize;
use std::fmt;

use crate::device::{ensure_device, find_device_mut, Device};
use crate::engine::Engine;
use crate::error::{ModelError, ModelResult};
use crate::sensor::SensorStatus;
use crate::vdevice::VDevice;

/// Serial reported for a host until the hostname mapping has been decoded.
pub const UNKNOWN_SERIAL: &str = "unknwn";

/// Immutable identity of a host: team type and 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HostId {
    pub team: char,
    pub index: usize,
}

impl HostId {
    pub fn new(team: char, index: usize) -> Self {
        Self { team, index }
    }

    /// Parse a `{team}host{NN}` sensor-name prefix.
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let team = chars.next().filter(char::is_ascii_alphabetic)?;
        let digits = chars.as_str().strip_prefix("host")?;
        if digits.len() < 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        Some(Self { team, index })
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}host{:02}", self.team, self.index)
    }
}

/// A host within a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    id: HostId,
    serial: String,
    input_stream: String,
    devices: Vec<Device>,
    engines: Vec<Engine>,
    vdevices: Vec<VDevice>,
}

impl Host {
    pub fn new(team: char, index: usize) -> Self {
        Self {
            id: HostId::new(team, index),
            serial: UNKNOWN_SERIAL.to_string(),
            input_stream: String::new(),
            devices: Vec::new(),
            engines: Vec::new(),
            vdevices: Vec::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn set_serial(&mut self, serial: &str) {
        serial.clone_into(&mut self.serial);
    }

    pub fn input_stream(&self) -> &str {
        &self.input_stream
    }

    /// Record the antenna feeding this host, dropping the polarisation suffix.
    pub fn set_input_stream(&mut self, label: &str) {
        let mut stream = label.to_string();
        stream.pop();
        self.input_stream = stream;
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn engines(&self) -> &[Engine] {
        &self.engines
    }

    pub fn engine(&self, name: &str) -> Option<&Engine> {
        self.engines.iter().find(|e| e.name() == name)
    }

    pub fn vdevices(&self) -> &[VDevice] {
        &self.vdevices
    }

    pub fn vdevice(&self, name: &str) -> Option<&VDevice> {
        self.vdevices.iter().find(|v| v.name() == name)
    }

    /// Aggregated status of a vdevice, `None` if no engine carries that device.
    pub fn vdevice_status(&self, name: &str) -> Option<SensorStatus> {
        self.vdevice(name).map(|v| v.status(self))
    }

    pub fn add_device_sensor(&mut self, device: &str, sensor: &str) {
        ensure_device(&mut self.devices, device).add_sensor(sensor);
    }

    /// Ensure `engine`/`device`/`sensor` exists and that the host has a
    /// vdevice for `device`.
    pub fn add_engine_device_sensor(&mut self, engine: &str, device: &str, sensor: &str) {
        let index = match self.engines.iter().position(|e| e.name() == engine) {
            Some(index) => index,
            None => {
                self.engines.push(Engine::new(engine));
                self.engines.len() - 1
            }
        };
        self.engines[index].add_device_sensor(device, sensor);

        if self.vdevice(device).is_none() {
            self.vdevices.push(VDevice::new(device, self.id));
        }
    }

    pub fn update_sensor(
        &mut self,
        device: &str,
        sensor: &str,
        value: &str,
        status: &str,
    ) -> ModelResult<()> {
        find_device_mut(&mut self.devices, device)?.update_sensor(sensor, value, status)
    }

    pub fn update_engine_sensor(
        &mut self,
        engine: &str,
        device: &str,
        sensor: &str,
        value: &str,
        status: &str,
    ) -> ModelResult<()> {
        self.engines
            .iter_mut()
            .find(|e| e.name() == engine)
            .ok_or_else(|| ModelError::NotFound(format!("engine {engine} on {}", self.id)))?
            .update_sensor(device, sensor, value, status)
    }
}
