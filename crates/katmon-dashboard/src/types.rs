//! JSON bodies of the dashboard API that are not plain snapshot views.

use chrono::{DateTime, Utc};
use katmon_cmc::{ArrayRef, ArrayView, ChannelView, CmcView, Liveness, MonitorSnapshot};
use katmon_katcp::ChannelState;
use serde::Serialize;

/// Error body for every non-2xx JSON response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// One array line of a CMC summary, without the sensor tree.
#[derive(Debug, Clone, Serialize)]
pub struct ArraySummary {
    pub name: String,
    pub antenna_count: usize,
    pub liveness: Liveness,
    pub functional: bool,
    pub control_state: ChannelState,
    pub monitor_state: ChannelState,
    pub instrument_state: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&ArrayView> for ArraySummary {
    fn from(view: &ArrayView) -> Self {
        Self {
            name: view.name.clone(),
            antenna_count: view.antenna_count,
            liveness: view.liveness,
            functional: view.functional,
            control_state: view.control.state,
            monitor_state: view.monitor.state,
            instrument_state: view.instrument_state.clone(),
            updated_at: view.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CmcSummary {
    pub position: usize,
    pub address: String,
    pub port: u16,
    pub connected: bool,
    pub reconnects: u64,
    pub channel: ChannelView,
    pub arrays: Vec<ArraySummary>,
}

impl From<&CmcView> for CmcSummary {
    fn from(view: &CmcView) -> Self {
        Self {
            position: view.position,
            address: view.address.clone(),
            port: view.port,
            connected: view.connected,
            reconnects: view.reconnects,
            channel: view.channel.clone(),
            arrays: view.arrays.iter().map(ArraySummary::from).collect(),
        }
    }
}

/// Body of `GET /api/cmcs`.
#[derive(Debug, Clone, Serialize)]
pub struct CmcList {
    pub generated_at: DateTime<Utc>,
    pub cmcs: Vec<CmcSummary>,
    pub ranked: Vec<ArrayRef>,
}

impl From<&MonitorSnapshot> for CmcList {
    fn from(snapshot: &MonitorSnapshot) -> Self {
        Self {
            generated_at: snapshot.generated_at,
            cmcs: snapshot.cmcs.iter().map(CmcSummary::from).collect(),
            ranked: snapshot.ranked.clone(),
        }
    }
}
