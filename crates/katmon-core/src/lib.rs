//! Sensor tree for correlator arrays.
//!
//! This crate provides the in-memory model that the monitor keeps up to date
//! from live sensor subscriptions:
//! - `Sensor`: name/value/status/last-update leaf
//! - `Device`: named group of sensors with an overall `device-status`
//! - `Engine`: named group of devices on a multi-engine host
//! - `VDevice`: status of one device aggregated across a host's engines
//! - `Host`, `Team`: processing nodes grouped by gateware type
//! - `SensorPath`: routing of dotted sensor names onto the tree

pub mod device;
pub mod engine;
pub mod error;
pub mod host;
pub mod path;
pub mod sensor;
pub mod team;
pub mod vdevice;

pub use device::{Device, DEVICE_STATUS};
pub use engine::Engine;
pub use error::{ModelError, ModelResult};
pub use host::{Host, HostId, UNKNOWN_SERIAL};
pub use path::SensorPath;
pub use sensor::{Sensor, SensorStatus};
pub use team::{Team, F_TEAM, X_TEAM};
pub use vdevice::{aggregate_status, VDevice};
