//! Scripted in-memory transports.
//!
//! A [`MockTransport`] records everything sent through it and replays
//! events pushed through its [`MockHandle`]. [`MockConnector`] hands out
//! such transports and keeps the handles so a test can play the remote side
//! of every connection the code under test opens.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::codec::parse_line;
use crate::error::{KatcpError, KatcpResult};
use crate::message::Message;
use crate::transport::{Connector, SendProgress, Transport, TransportEvent};

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Message>,
    pending: VecDeque<TransportEvent>,
    would_block: bool,
    broken: bool,
}

/// Remote-side control of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    peer: String,
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Complete the asynchronous connect.
    pub fn connect(&self) {
        self.push(TransportEvent::Connected);
    }

    /// Deliver an incoming message.
    pub fn deliver(&self, message: Message) {
        self.push(TransportEvent::Line(message));
    }

    /// Deliver one raw protocol line, e.g. `"!array-list ok"`.
    ///
    /// Panics on a line that does not parse; scripts are written by hand.
    pub fn deliver_line(&self, line: &str) {
        match parse_line(line) {
            Ok(message) => self.deliver(message),
            Err(e) => panic!("bad scripted line {line:?}: {e}"),
        }
    }

    /// Fail the connection; later sends are rejected.
    pub fn close(&self, reason: &str) {
        let mut state = self.state.lock();
        state.broken = true;
        state.pending.push_back(TransportEvent::Closed(reason.to_string()));
    }

    /// Make `try_send` report back-pressure.
    pub fn set_would_block(&self, would_block: bool) {
        self.state.lock().would_block = would_block;
    }

    /// Everything sent so far, rendered with [`Message::compose`].
    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().sent.iter().map(Message::compose).collect()
    }

    /// Take and clear the sent log.
    pub fn take_sent(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.sent.drain(..).map(|m| m.compose()).collect()
    }

    fn push(&self, event: TransportEvent) {
        self.state.lock().pending.push_back(event);
    }
}

/// In-memory [`Transport`] driven by a [`MockHandle`].
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    pub fn new(peer: impl Into<String>) -> (Self, MockHandle) {
        let handle = MockHandle {
            peer: peer.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        };
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Transport for MockTransport {
    fn try_send(&mut self, message: &Message) -> KatcpResult<SendProgress> {
        let mut state = self.handle.state.lock();
        if state.broken {
            return Err(KatcpError::Disconnected(self.handle.peer.clone()));
        }
        if state.would_block {
            return Ok(SendProgress::WouldBlock);
        }
        state.sent.push(message.clone());
        Ok(SendProgress::Accepted)
    }

    fn drain_events(&mut self) -> Vec<TransportEvent> {
        self.handle.state.lock().pending.drain(..).collect()
    }

    fn has_unflushed(&self) -> bool {
        false
    }

    fn peer(&self) -> &str {
        &self.handle.peer
    }
}

/// [`Connector`] that opens [`MockTransport`]s and remembers their handles.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    opened: Arc<Mutex<HashMap<(String, u16), Vec<MockHandle>>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the most recent transport opened to `host:port`.
    pub fn handle(&self, host: &str, port: u16) -> Option<MockHandle> {
        self.opened
            .lock()
            .get(&(host.to_string(), port))
            .and_then(|handles| handles.last().cloned())
    }

    /// Number of transports opened to `host:port` so far.
    pub fn open_count(&self, host: &str, port: u16) -> usize {
        self.opened
            .lock()
            .get(&(host.to_string(), port))
            .map_or(0, Vec::len)
    }
}

impl Connector for MockConnector {
    fn open(&self, host: &str, port: u16) -> Box<dyn Transport> {
        let (transport, handle) = MockTransport::new(format!("{host}:{port}"));
        self.opened
            .lock()
            .entry((host.to_string(), port))
            .or_default()
            .push(handle);
        Box::new(transport)
    }
}
