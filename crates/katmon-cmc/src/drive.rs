//! Channel pumping shared by CMC servers and arrays.

use katmon_katcp::{Channel, KatcpError, Message, Multiplexed};
use katmon_telemetry::Metrics;
use tracing::error;

/// Hand in-flight requests to the transport until it stops taking them.
pub(crate) fn flush(channel: &mut Channel) {
    let mut sent = 0;
    while channel.wants_write() {
        match channel.on_writable() {
            Ok(true) => sent += 1,
            Ok(false) => break,
            Err(KatcpError::EmptyMessage) => {
                error!(role = %channel.role(), "Empty request stuck at head of queue");
                break;
            }
            Err(_) => break,
        }
    }
    Metrics::requests_sent(channel.role().as_str(), sent);
}

/// Count a non-ok reply.
pub(crate) fn record_reply(request: &Message, reply: &Message) {
    if !reply.is_ok_reply() {
        Metrics::request_failed(request.name().unwrap_or("unknown"));
    }
}

/// The word at `index`, or `"none"` when the inform is short.
///
/// A missing field is logged and counted.
pub(crate) fn field_or_none<'m>(message: &'m Message, index: usize, what: &str) -> &'m str {
    match message.arg(index) {
        Some(word) => word,
        None => {
            error!(inform = %message, field = what, "Inform field missing, using \"none\"");
            Metrics::malformed_inform("null_field");
            "none"
        }
    }
}
