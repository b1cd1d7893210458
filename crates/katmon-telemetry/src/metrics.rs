//! Prometheus metrics for katmon.
//!
//! Covers:
//! - Channel connectivity and state per role (cmc/control/monitor)
//! - Inform traffic and malformed payloads
//! - Request sends and rejections
//! - Array discovery, pruning and CMC reconnects
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error and is hit during
//! static initialization, never later.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Channel states a channel can be in; one series each per role.
const CHANNEL_STATES: [&str; 5] = [
    "wait_connect",
    "send_front_of_queue",
    "wait_response",
    "monitor",
    "disconnected",
];

/// Connected channels per role.
pub static CHANNELS_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "katmon_channels_connected",
        "Channels not in the disconnected state",
        &["role"]
    )
    .unwrap()
});

/// Number of channels in each state.
/// Labels: role (cmc/control/monitor), state
pub static CHANNEL_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "katmon_channel_state",
        "Channels per state machine state",
        &["role", "state"]
    )
    .unwrap()
});

/// Informs received, by inform name.
pub static INFORMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "katmon_informs_total",
        "KATCP informs received",
        &["kind"]
    )
    .unwrap()
});

/// Requests handed to a transport.
pub static REQUESTS_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "katmon_requests_sent_total",
        "KATCP requests sent",
        &["role"]
    )
    .unwrap()
});

/// Requests answered with a non-ok reply.
pub static REQUEST_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "katmon_request_failures_total",
        "KATCP requests rejected by the server",
        &["request"]
    )
    .unwrap()
});

/// Arrays currently tracked across all CMCs.
pub static ARRAYS: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("katmon_arrays", "Arrays currently tracked").unwrap());

/// Arrays removed because their CMC stopped listing them.
pub static ARRAYS_PRUNED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "katmon_arrays_pruned_total",
        "Arrays pruned after array-list reconciliation"
    )
    .unwrap()
});

/// CMC reconnect attempts.
pub static CMC_RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "katmon_cmc_reconnects_total",
        "CMC connection re-open attempts"
    )
    .unwrap()
});

/// Informs with payloads that could not be applied.
pub static MALFORMED_INFORMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "katmon_malformed_informs_total",
        "Inform payloads skipped or defaulted",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade used by the rest of the workspace.
pub struct Metrics;

impl Metrics {
    /// Record an inform by name.
    pub fn inform_received(kind: &str) {
        INFORMS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record `count` requests sent on channels of `role`.
    pub fn requests_sent(role: &str, count: u64) {
        if count > 0 {
            REQUESTS_SENT_TOTAL.with_label_values(&[role]).inc_by(count);
        }
    }

    /// Record a rejected request.
    pub fn request_failed(request: &str) {
        REQUEST_FAILURES_TOTAL.with_label_values(&[request]).inc();
    }

    /// Record a malformed inform payload.
    pub fn malformed_inform(reason: &str) {
        MALFORMED_INFORMS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn arrays_pruned(count: usize) {
        ARRAYS_PRUNED_TOTAL.inc_by(count as u64);
    }

    pub fn cmc_reconnect() {
        CMC_RECONNECTS_TOTAL.inc();
    }

    pub fn arrays_set(count: usize) {
        ARRAYS.set(count as i64);
    }

    /// Publish per-state channel counts for one role.
    ///
    /// `counts` pairs a state label with the number of channels in it; states
    /// not listed are reset to 0.
    pub fn channel_states_set(role: &str, counts: &[(&str, i64)]) {
        let mut connected = 0;
        for state in CHANNEL_STATES {
            let n = counts
                .iter()
                .filter(|(s, _)| *s == state)
                .map(|(_, n)| *n)
                .sum::<i64>();
            CHANNEL_STATE.with_label_values(&[role, state]).set(n);
            if state != "disconnected" {
                connected += n;
            }
        }
        CHANNELS_CONNECTED.with_label_values(&[role]).set(connected);
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_states_set_counts_connected() {
        Metrics::channel_states_set(
            "control",
            &[("monitor", 3), ("wait_response", 1), ("disconnected", 2)],
        );
        assert_eq!(
            CHANNEL_STATE
                .with_label_values(&["control", "monitor"])
                .get(),
            3
        );
        assert_eq!(
            CHANNEL_STATE
                .with_label_values(&["control", "wait_connect"])
                .get(),
            0
        );
        assert_eq!(CHANNELS_CONNECTED.with_label_values(&["control"]).get(), 4);
    }

    #[test]
    fn test_gather_text_contains_registered_metrics() {
        Metrics::inform_received("sensor-status");
        Metrics::arrays_set(2);
        let text = gather_text().unwrap();
        assert!(text.contains("katmon_informs_total"));
        assert!(text.contains("katmon_arrays 2"));
    }
}
