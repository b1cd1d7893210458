//! Request/reply state machine for one KATCP connection.
//!
//! Every upstream socket (the CMC connection, and the control and monitor
//! connections of each array) is driven by a [`Channel`]. A channel keeps at
//! most one request in flight: the next request is only sent once the
//! matching reply has arrived.
//!
//! ```text
//! WaitConnect ──connected──▶ SendFrontOfQueue ──sent──▶ WaitResponse
//!                                  ▲                        │
//!                                  └──── ok, more queued ───┤
//!                                  └──── fail (retry) ──────┤
//!                  Monitor ◀──────── ok, queue empty ───────┘
//! ```
//!
//! Any transport failure moves the channel to `Disconnected`.

use serde::Serialize;
use std::fmt;
use tracing::{debug, error, warn};

use crate::error::{KatcpError, KatcpResult};
use crate::message::{Message, MessageKind};
use crate::queue::MessageQueue;
use crate::transport::{SendProgress, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    WaitConnect,
    SendFrontOfQueue,
    WaitResponse,
    Monitor,
    Disconnected,
}

impl ChannelState {
    pub const ALL: [ChannelState; 5] = [
        Self::WaitConnect,
        Self::SendFrontOfQueue,
        Self::WaitResponse,
        Self::Monitor,
        Self::Disconnected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitConnect => "wait_connect",
            Self::SendFrontOfQueue => "send_front_of_queue",
            Self::WaitResponse => "wait_response",
            Self::Monitor => "monitor",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which connection a channel serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Cmc,
    Control,
    Monitor,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 3] = [Self::Cmc, Self::Control, Self::Monitor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cmc => "cmc",
            Self::Control => "control",
            Self::Monitor => "monitor",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the owner of a channel has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An inform, in any state.
    Inform(Message),
    /// A reply matching the in-flight request, `ok` or not.
    Reply { request: Message, reply: Message },
}

/// Per-channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub replies_ok: u64,
    pub replies_failed: u64,
    pub informs: u64,
    pub unexpected: u64,
}

/// Readiness-driven I/O surface of a socket owner.
pub trait Multiplexed {
    /// Whether incoming data should be processed.
    fn wants_read(&self) -> bool;

    /// Whether there is something to hand to the transport.
    fn wants_write(&self) -> bool;

    /// Process everything the transport received since the last call.
    fn on_readable(&mut self) -> Vec<ChannelEvent>;

    /// Try to send the in-flight request. Returns true when it was handed over.
    fn on_writable(&mut self) -> KatcpResult<bool>;
}

/// One KATCP connection with its outgoing queue and in-flight request.
pub struct Channel {
    role: ChannelRole,
    state: ChannelState,
    transport: Box<dyn Transport>,
    queue: MessageQueue,
    current: Option<Message>,
    failures: u32,
    max_retries: u32,
    stats: ChannelStats,
    has_connected: bool,
}

impl Channel {
    /// Channel whose transport is still connecting; starts in `WaitConnect`.
    pub fn connecting(
        role: ChannelRole,
        transport: Box<dyn Transport>,
        seed: impl IntoIterator<Item = Message>,
    ) -> Self {
        let mut channel = Self::bare(role, transport, ChannelState::WaitConnect);
        channel.seed(seed);
        channel
    }

    /// Channel that may send straight away; starts in `SendFrontOfQueue`
    /// with the first seeded request in flight.
    pub fn connected(
        role: ChannelRole,
        transport: Box<dyn Transport>,
        seed: impl IntoIterator<Item = Message>,
    ) -> Self {
        let mut channel = Self::bare(role, transport, ChannelState::SendFrontOfQueue);
        channel.seed(seed);
        channel.advance();
        channel
    }

    fn bare(role: ChannelRole, transport: Box<dyn Transport>, state: ChannelState) -> Self {
        Self {
            role,
            state,
            transport,
            queue: MessageQueue::new(),
            current: None,
            failures: 0,
            max_retries: 0,
            stats: ChannelStats::default(),
            has_connected: false,
        }
    }

    /// Drop a request after it failed this many times. 0 retries forever.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn seed(&mut self, seed: impl IntoIterator<Item = Message>) {
        for message in seed {
            self.queue.push(message);
        }
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == ChannelState::Disconnected
    }

    /// Whether the transport has reported a completed connect since the
    /// channel was opened or last reset.
    pub fn has_connected(&self) -> bool {
        self.has_connected
    }

    /// The request in flight, if any.
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// Requests waiting behind the in-flight one.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    /// Enqueue a request.
    ///
    /// An idle channel (`Monitor`) takes it in flight immediately.
    pub fn push(&mut self, message: Message) {
        if self.state == ChannelState::Monitor && self.current.is_none() {
            debug!(role = %self.role, request = %message, "Channel leaving monitor");
            self.current = Some(message);
            self.state = ChannelState::SendFrontOfQueue;
        } else {
            self.queue.push(message);
        }
    }

    /// Mark the channel dead. It stops taking part in I/O.
    pub fn disconnect(&mut self, reason: &str) {
        if self.state != ChannelState::Disconnected {
            warn!(role = %self.role, peer = %self.transport.peer(), reason, "Channel disconnected");
        }
        self.state = ChannelState::Disconnected;
    }

    /// Swap in a new transport and start over from `WaitConnect`.
    ///
    /// Stale queued and in-flight requests are discarded in favour of `seed`.
    pub fn reset(&mut self, transport: Box<dyn Transport>, seed: impl IntoIterator<Item = Message>) {
        self.transport = transport;
        self.queue.clear();
        self.current = None;
        self.failures = 0;
        self.has_connected = false;
        self.state = ChannelState::WaitConnect;
        self.seed(seed);
    }

    /// Take the next queued request in flight, or go idle.
    fn advance(&mut self) {
        self.failures = 0;
        self.current = self.queue.pop();
        self.state = if self.current.is_some() {
            ChannelState::SendFrontOfQueue
        } else {
            ChannelState::Monitor
        };
    }

    fn handle_reply(&mut self, reply: Message, events: &mut Vec<ChannelEvent>) {
        let matches = self.state == ChannelState::WaitResponse
            && self
                .current
                .as_ref()
                .is_some_and(|request| request.name() == reply.name());
        if !matches {
            self.stats.unexpected += 1;
            warn!(role = %self.role, reply = %reply, state = %self.state, "Unexpected reply");
            return;
        }
        let Some(request) = self.current.clone() else {
            return;
        };

        if reply.is_ok_reply() {
            self.stats.replies_ok += 1;
            debug!(role = %self.role, request = %request, "Request acknowledged");
            self.advance();
        } else {
            self.stats.replies_failed += 1;
            self.failures += 1;
            if self.max_retries > 0 && self.failures > self.max_retries {
                error!(
                    role = %self.role,
                    request = %request,
                    reply = %reply,
                    attempts = self.failures,
                    "Request rejected too often, dropping it"
                );
                self.advance();
            } else {
                warn!(role = %self.role, request = %request, reply = %reply, "Request rejected, retrying");
                self.state = ChannelState::SendFrontOfQueue;
            }
        }
        events.push(ChannelEvent::Reply { request, reply });
    }
}

impl Multiplexed for Channel {
    fn wants_read(&self) -> bool {
        self.state != ChannelState::Disconnected
    }

    fn wants_write(&self) -> bool {
        match self.state {
            ChannelState::Disconnected => false,
            ChannelState::WaitConnect => true,
            ChannelState::SendFrontOfQueue if self.current.is_some() => true,
            _ => self.transport.has_unflushed(),
        }
    }

    fn on_readable(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if self.state == ChannelState::Disconnected {
            return events;
        }

        for event in self.transport.drain_events() {
            match event {
                TransportEvent::Connected => {
                    self.has_connected = true;
                    if self.state == ChannelState::WaitConnect {
                        debug!(role = %self.role, peer = %self.transport.peer(), "Channel connected");
                        self.advance();
                    }
                }
                TransportEvent::Closed(reason) => {
                    self.disconnect(&reason);
                    break;
                }
                TransportEvent::Line(message) => match message.kind() {
                    MessageKind::Inform => {
                        self.stats.informs += 1;
                        events.push(ChannelEvent::Inform(message));
                    }
                    MessageKind::Reply => self.handle_reply(message, &mut events),
                    MessageKind::Request => {
                        self.stats.unexpected += 1;
                        warn!(role = %self.role, message = %message, "Ignoring request from upstream");
                    }
                },
            }
        }
        events
    }

    fn on_writable(&mut self) -> KatcpResult<bool> {
        if self.state != ChannelState::SendFrontOfQueue {
            return Ok(false);
        }
        let Some(request) = self.current.as_ref() else {
            return Ok(false);
        };
        if request.is_empty() {
            error!(role = %self.role, "Refusing to send a message without words");
            return Err(KatcpError::EmptyMessage);
        }

        match self.transport.try_send(request) {
            Ok(SendProgress::Accepted) => {
                debug!(role = %self.role, request = %request, "Request sent");
                self.stats.sent += 1;
                self.state = ChannelState::WaitResponse;
                Ok(true)
            }
            Ok(SendProgress::WouldBlock) => Ok(false),
            Err(e) => {
                self.disconnect(&e.to_string());
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer", &self.transport.peer())
            .field("current", &self.current)
            .field("queued", &self.queue.len())
            .finish()
    }
}
