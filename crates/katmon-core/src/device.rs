//! Devices: named groups of sensors.

use serde::Serialize;

use crate::error::{ModelError, ModelResult};
use crate::sensor::{ensure_sensor, find_sensor, Sensor};

/// Name of the sensor carrying a device's overall status.
pub const DEVICE_STATUS: &str = "device-status";

/// A functional block on a host or engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    name: String,
    sensors: Vec<Sensor>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sensors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn sensor(&self, name: &str) -> Option<&Sensor> {
        find_sensor(&self.sensors, name)
    }

    /// Add a sensor, or return the existing one with that name.
    pub fn add_sensor(&mut self, name: &str) -> &mut Sensor {
        ensure_sensor(&mut self.sensors, name)
    }

    /// Update an existing sensor.
    pub fn update_sensor(&mut self, name: &str, value: &str, status: &str) -> ModelResult<()> {
        let sensor = self
            .sensors
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| ModelError::NotFound(format!("sensor {name} on device {}", self.name)))?;
        sensor.update(value, status);
        Ok(())
    }

    /// The `device-status` sensor, if it has been subscribed.
    pub fn device_status(&self) -> Option<&Sensor> {
        self.sensor(DEVICE_STATUS)
    }
}

/// Find a device by name, appending a fresh one if it does not exist yet.
pub(crate) fn ensure_device<'a>(devices: &'a mut Vec<Device>, name: &str) -> &'a mut Device {
    let index = match devices.iter().position(|d| d.name == name) {
        Some(index) => index,
        None => {
            devices.push(Device::new(name));
            devices.len() - 1
        }
    };
    &mut devices[index]
}

pub(crate) fn find_device_mut<'a>(
    devices: &'a mut [Device],
    name: &str,
) -> ModelResult<&'a mut Device> {
    devices
        .iter_mut()
        .find(|d| d.name == name)
        .ok_or_else(|| ModelError::NotFound(format!("device {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_sensor() {
        let mut device = Device::new("spead-rx");
        assert!(device.device_status().is_none());

        device.add_sensor(DEVICE_STATUS);
        device
            .update_sensor(DEVICE_STATUS, "ok", "nominal")
            .unwrap();

        let status = device.device_status().unwrap();
        assert_eq!(status.status(), "nominal");
    }

    #[test]
    fn test_update_unknown_sensor_is_not_found() {
        let mut device = Device::new("spead-rx");
        let err = device.update_sensor("missing", "1", "nominal").unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert!(device.sensors().is_empty());
    }

    #[test]
    fn test_add_sensor_twice_keeps_one() {
        let mut device = Device::new("network");
        device.add_sensor("rx-errors");
        device.add_sensor("rx-errors");
        assert_eq!(device.sensors().len(), 1);
    }
}
