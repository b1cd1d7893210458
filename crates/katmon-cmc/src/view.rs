//! Owned, serialisable snapshots of the monitor state.
//!
//! The event loop captures a [`MonitorSnapshot`] after every iteration and
//! publishes it to readers (the dashboard). Snapshots never borrow from the
//! live CMC list.

use chrono::{DateTime, Utc};
use katmon_core::{Device, Engine, Host, Sensor, SensorStatus, Team};
use katmon_katcp::{Channel, ChannelRole, ChannelState, ChannelStats};
use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::array::{Array, Liveness};
use crate::cmc::{ArrayLookup, CmcServer};

#[derive(Debug, Clone, Serialize)]
pub struct ChannelView {
    pub role: ChannelRole,
    pub state: ChannelState,
    pub peer: String,
    pub in_flight: Option<String>,
    pub queued: usize,
    pub stats: ChannelStats,
}

impl ChannelView {
    pub fn capture(channel: &Channel) -> Self {
        Self {
            role: channel.role(),
            state: channel.state(),
            peer: channel.peer().to_string(),
            in_flight: channel.current().map(|m| m.compose()),
            queued: channel.queue().len(),
            stats: channel.stats(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VDeviceView {
    pub name: String,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostView {
    pub name: String,
    pub serial: String,
    pub input_stream: String,
    pub devices: Vec<Device>,
    pub engines: Vec<Engine>,
    pub vdevices: Vec<VDeviceView>,
}

impl HostView {
    fn capture(host: &Host) -> Self {
        Self {
            name: host.id().to_string(),
            serial: host.serial().to_string(),
            input_stream: host.input_stream().to_string(),
            devices: host.devices().to_vec(),
            engines: host.engines().to_vec(),
            vdevices: host
                .vdevices()
                .iter()
                .map(|v| VDeviceView {
                    name: v.name().to_string(),
                    status: v.status(host),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamView {
    pub kind: char,
    pub hosts: Vec<HostView>,
}

impl TeamView {
    fn capture(team: &Team) -> Self {
        Self {
            kind: team.kind(),
            hosts: team.hosts().iter().map(HostView::capture).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArrayView {
    pub name: String,
    pub cmc_address: String,
    pub control_port: u16,
    pub monitor_port: u16,
    pub antenna_count: usize,
    pub liveness: Liveness,
    pub functional: bool,
    pub control: ChannelView,
    pub monitor: ChannelView,
    pub instrument_state: String,
    pub config_file: String,
    pub activations: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub sensors: Vec<Sensor>,
    pub teams: Vec<TeamView>,
}

impl ArrayView {
    pub fn capture(array: &Array) -> Self {
        Self {
            name: array.name().to_string(),
            cmc_address: array.cmc_address().to_string(),
            control_port: array.control_port(),
            monitor_port: array.monitor_port(),
            antenna_count: array.antenna_count(),
            liveness: array.liveness(),
            functional: array.is_functional(),
            control: ChannelView::capture(array.control()),
            monitor: ChannelView::capture(array.monitor()),
            instrument_state: array.instrument_state().to_string(),
            config_file: array.config_file().to_string(),
            activations: array.activations(),
            updated_at: array.updated_at(),
            sensors: array.sensors().to_vec(),
            teams: array.teams().iter().map(TeamView::capture).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CmcView {
    /// 1-based position in the configured CMC list.
    pub position: usize,
    pub address: String,
    pub port: u16,
    pub connected: bool,
    pub reconnects: u64,
    pub channel: ChannelView,
    pub arrays: Vec<ArrayView>,
}

/// Entry of the size ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayRef {
    /// 1-based rank, largest array first.
    pub rank: usize,
    /// 1-based position of the owning CMC.
    pub cmc: usize,
    pub name: String,
    pub antenna_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub generated_at: DateTime<Utc>,
    pub cmcs: Vec<CmcView>,
    pub ranked: Vec<ArrayRef>,
}

impl Default for MonitorSnapshot {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            cmcs: Vec::new(),
            ranked: Vec::new(),
        }
    }
}

impl MonitorSnapshot {
    /// Copy out everything readers need.
    pub fn capture(cmcs: &[CmcServer]) -> Self {
        let views = cmcs
            .iter()
            .enumerate()
            .map(|(i, cmc)| CmcView {
                position: i + 1,
                address: cmc.address().to_string(),
                port: cmc.port(),
                connected: cmc.is_connected(),
                reconnects: cmc.reconnects(),
                channel: ChannelView::capture(cmc.channel()),
                arrays: cmc.arrays().iter().map(ArrayView::capture).collect(),
            })
            .collect();

        let ranked = Aggregator::new(cmcs)
            .iter()
            .enumerate()
            .map(|(rank, entry)| ArrayRef {
                rank: rank + 1,
                cmc: entry.cmc + 1,
                name: entry.array.name().to_string(),
                antenna_count: entry.array.antenna_count(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            cmcs: views,
            ranked,
        }
    }

    /// CMC by 1-based position.
    pub fn cmc(&self, position: usize) -> Option<&CmcView> {
        position.checked_sub(1).and_then(|i| self.cmcs.get(i))
    }

    /// Array of one CMC, by 1-based position or name.
    pub fn array(&self, cmc: usize, key: &str) -> Option<&ArrayView> {
        let view = self.cmc(cmc)?;
        ArrayLookup::parse(key)
            .resolve_by(&view.arrays, |a| a.name.as_str())
            .map(|index| &view.arrays[index])
    }

    /// Array by 1-based size rank.
    pub fn ranked_array(&self, rank: usize) -> Option<&ArrayView> {
        let entry = rank.checked_sub(1).and_then(|i| self.ranked.get(i))?;
        self.cmc(entry.cmc)?
            .arrays
            .iter()
            .find(|a| a.name == entry.name)
    }

    pub fn array_count(&self) -> usize {
        self.ranked.len()
    }

    /// Channel counts per role and state, for gauges.
    pub fn channel_states(&self) -> Vec<(ChannelRole, ChannelState)> {
        let mut states = Vec::new();
        for cmc in &self.cmcs {
            states.push((ChannelRole::Cmc, cmc.channel.state));
            for array in &cmc.arrays {
                states.push((ChannelRole::Control, array.control.state));
                states.push((ChannelRole::Monitor, array.monitor.state));
            }
        }
        states
    }
}
