//! Virtual devices: one device name viewed across all engines of a host.

use serde::Serialize;

use crate::device::DEVICE_STATUS;
use crate::host::{Host, HostId};
use crate::sensor::SensorStatus;

/// Aggregate of the same-named device across a host's engines.
///
/// Holds no sensors of its own. The engines are resolved through the owning
/// [`Host`] every time the status is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VDevice {
    name: String,
    host: HostId,
}

impl VDevice {
    pub fn new(name: impl Into<String>, host: HostId) -> Self {
        Self {
            name: name.into(),
            host,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// Worst `device-status` of this device across the host's engines.
    ///
    /// Returns `Unknown` when `host` is not the host this vdevice belongs to.
    pub fn status(&self, host: &Host) -> SensorStatus {
        if host.id() != self.host {
            return SensorStatus::Unknown;
        }
        aggregate_status(host.engines().iter().map(|engine| {
            engine
                .device(&self.name)
                .and_then(|d| d.sensor(DEVICE_STATUS))
                .and_then(|s| s.status_kind())
        }))
    }
}

/// Fold per-engine statuses with precedence `nominal < warn < error`.
///
/// `failure` ranks with `error`. Other statuses, and engines without the
/// device, do not take part. With nothing matched the result is `Unknown`.
pub fn aggregate_status<I>(statuses: I) -> SensorStatus
where
    I: IntoIterator<Item = Option<SensorStatus>>,
{
    let mut worst: Option<(u8, SensorStatus)> = None;
    for status in statuses.into_iter().flatten() {
        let rank = match status {
            SensorStatus::Nominal => 1,
            SensorStatus::Warn => 2,
            SensorStatus::Error | SensorStatus::Failure => 3,
            _ => continue,
        };
        if worst.map_or(true, |(r, _)| rank > r) {
            worst = Some((rank, status));
        }
    }
    match worst {
        Some((3, _)) => SensorStatus::Error,
        Some((_, status)) => status,
        None => SensorStatus::Unknown,
    }
}
