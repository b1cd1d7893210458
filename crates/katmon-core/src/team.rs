//! Teams: fixed-size collections of hosts of one gateware type.

use serde::Serialize;

use crate::error::{ModelError, ModelResult};
use crate::host::Host;

/// Filter/channeliser team.
pub const F_TEAM: char = 'f';
/// Cross-correlator team.
pub const X_TEAM: char = 'x';

/// All hosts of one type within an array, indexed `0..size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    kind: char,
    hosts: Vec<Host>,
}

impl Team {
    /// Create a team with `size` host slots.
    pub fn new(kind: char, size: usize) -> Self {
        Self {
            kind,
            hosts: (0..size).map(|index| Host::new(kind, index)).collect(),
        }
    }

    pub fn kind(&self) -> char {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.hosts.len()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    pub fn host_mut(&mut self, index: usize) -> ModelResult<&mut Host> {
        let size = self.hosts.len();
        let team = self.kind;
        self.hosts
            .get_mut(index)
            .ok_or(ModelError::HostIndexOutOfRange { team, index, size })
    }

    pub fn add_host_device_sensor(
        &mut self,
        index: usize,
        device: &str,
        sensor: &str,
    ) -> ModelResult<()> {
        self.host_mut(index)?.add_device_sensor(device, sensor);
        Ok(())
    }

    pub fn add_host_engine_device_sensor(
        &mut self,
        index: usize,
        engine: &str,
        device: &str,
        sensor: &str,
    ) -> ModelResult<()> {
        self.host_mut(index)?
            .add_engine_device_sensor(engine, device, sensor);
        Ok(())
    }

    pub fn update_sensor(
        &mut self,
        index: usize,
        device: &str,
        sensor: &str,
        value: &str,
        status: &str,
    ) -> ModelResult<()> {
        self.host_mut(index)?
            .update_sensor(device, sensor, value, status)
    }

    pub fn update_engine_sensor(
        &mut self,
        index: usize,
        engine: &str,
        device: &str,
        sensor: &str,
        value: &str,
        status: &str,
    ) -> ModelResult<()> {
        self.host_mut(index)?
            .update_engine_sensor(engine, device, sensor, value, status)
    }
}
