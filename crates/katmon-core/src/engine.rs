//! Engines: logical sub-units of a host, each with its own devices.

use serde::Serialize;

use crate::device::{ensure_device, find_device_mut, Device};
use crate::error::ModelResult;

/// A logical engine (e.g. `xeng0`) on a multi-engine host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Engine {
    name: String,
    devices: Vec<Device>,
}

impl Engine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            devices: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Ensure `device` exists on this engine and carries `sensor`.
    pub fn add_device_sensor(&mut self, device: &str, sensor: &str) {
        ensure_device(&mut self.devices, device).add_sensor(sensor);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEVICE_STATUS;
    use crate::error::ModelError;

    #[test]
    fn test_engine_builds_devices_on_demand() {
        let mut engine = Engine::new("xeng0");
        engine.add_device_sensor("bram-reorder", DEVICE_STATUS);
        engine.add_device_sensor("bram-reorder", DEVICE_STATUS);
        engine.add_device_sensor("vacc", DEVICE_STATUS);

        assert_eq!(engine.devices().len(), 2);
        engine
            .update_sensor("vacc", DEVICE_STATUS, "ok", "warn")
            .unwrap();
        let status = engine.device("vacc").unwrap().device_status().unwrap();
        assert_eq!(status.status(), "warn");
    }

    #[test]
    fn test_update_missing_device() {
        let mut engine = Engine::new("xeng1");
        let err = engine
            .update_sensor("vacc", DEVICE_STATUS, "ok", "nominal")
            .unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }
}
