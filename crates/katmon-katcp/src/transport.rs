//! Non-blocking transports underneath a [`crate::Channel`].
//!
//! The state machine never touches sockets directly. It hands whole messages
//! to a [`Transport`] and drains the events the transport has collected since
//! the last call. The production transport runs one tokio task per socket
//! and wakes the event loop through a shared [`Notify`].

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::KatcpCodec;
use crate::error::{KatcpError, KatcpResult};
use crate::message::Message;

/// Outbound buffer depth per socket.
const OUTBOUND_CAPACITY: usize = 64;

/// Something that happened on a transport since it was last drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Asynchronous connect completed.
    Connected,
    /// A fully framed incoming message.
    Line(Message),
    /// The connection failed or was closed; no further events follow.
    Closed(String),
}

/// Result of handing a message to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendProgress {
    Accepted,
    /// The transport cannot take more right now; try again later.
    WouldBlock,
}

/// A socket handle as seen by the channel state machine.
pub trait Transport: Send {
    /// Hand a message over for transmission without blocking.
    fn try_send(&mut self, message: &Message) -> KatcpResult<SendProgress>;

    /// Take every event collected since the previous call.
    fn drain_events(&mut self) -> Vec<TransportEvent>;

    /// True while accepted messages have not been written to the socket yet.
    fn has_unflushed(&self) -> bool;

    /// Remote endpoint, for logging.
    fn peer(&self) -> &str;
}

/// Opens transports to upstream endpoints.
pub trait Connector {
    fn open(&self, host: &str, port: u16) -> Box<dyn Transport>;
}

/// Tokio TCP transport.
///
/// Connects asynchronously; messages accepted before the connection is up
/// are buffered and written once it is.
pub struct TcpTransport {
    peer: String,
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    unflushed: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
}

impl TcpTransport {
    /// Start connecting to `host:port`. Must be called within a tokio runtime.
    pub fn spawn(host: &str, port: u16, wake: Arc<Notify>) -> Self {
        let peer = format!("{host}:{port}");
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let unflushed = Arc::new(AtomicUsize::new(0));
        let shutdown_token = CancellationToken::new();

        let io = ConnectionIo {
            peer: peer.clone(),
            outbound: outbound_rx,
            inbound: inbound_tx,
            unflushed: unflushed.clone(),
            wake,
            shutdown_token: shutdown_token.clone(),
        };
        tokio::spawn(io.run());

        Self {
            peer,
            outbound: outbound_tx,
            inbound: inbound_rx,
            unflushed,
            shutdown_token,
        }
    }
}

impl Transport for TcpTransport {
    fn try_send(&mut self, message: &Message) -> KatcpResult<SendProgress> {
        self.unflushed.fetch_add(1, Ordering::AcqRel);
        match self.outbound.try_send(message.clone()) {
            Ok(()) => Ok(SendProgress::Accepted),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.unflushed.fetch_sub(1, Ordering::AcqRel);
                Ok(SendProgress::WouldBlock)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unflushed.fetch_sub(1, Ordering::AcqRel);
                Err(KatcpError::Disconnected(format!(
                    "{}: connection task stopped",
                    self.peer
                )))
            }
        }
    }

    fn drain_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbound.try_recv() {
            events.push(event);
        }
        events
    }

    fn has_unflushed(&self) -> bool {
        self.unflushed.load(Ordering::Acquire) > 0
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Socket side of a [`TcpTransport`], owned by its tokio task.
struct ConnectionIo {
    peer: String,
    outbound: mpsc::Receiver<Message>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    unflushed: Arc<AtomicUsize>,
    wake: Arc<Notify>,
    shutdown_token: CancellationToken,
}

impl ConnectionIo {
    async fn run(mut self) {
        let stream = tokio::select! {
            () = self.shutdown_token.cancelled() => return,
            result = TcpStream::connect(&self.peer) => result,
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "KATCP connect failed");
                self.emit(TransportEvent::Closed(format!("connect failed: {e}")));
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %self.peer, error = %e, "Failed to set TCP_NODELAY");
        }
        info!(peer = %self.peer, "KATCP connected");
        self.emit(TransportEvent::Connected);

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, KatcpCodec::default());
        let mut writer = FramedWrite::new(write_half, KatcpCodec::default());

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    debug!(peer = %self.peer, "KATCP transport shut down");
                    return;
                }

                frame = reader.next() => match frame {
                    Some(Ok(message)) => self.emit(TransportEvent::Line(message)),
                    Some(Err(e)) => {
                        warn!(peer = %self.peer, error = %e, "KATCP read error");
                        self.emit(TransportEvent::Closed(format!("read failed: {e}")));
                        return;
                    }
                    None => {
                        warn!(peer = %self.peer, "KATCP connection closed by peer");
                        self.emit(TransportEvent::Closed("closed by peer".to_string()));
                        return;
                    }
                },

                Some(message) = self.outbound.recv() => {
                    let result = writer.send(message).await;
                    self.unflushed.fetch_sub(1, Ordering::AcqRel);
                    if let Err(e) = result {
                        warn!(peer = %self.peer, error = %e, "KATCP write error");
                        self.emit(TransportEvent::Closed(format!("write failed: {e}")));
                        return;
                    }
                }
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.inbound.send(event).is_err() {
            debug!(peer = %self.peer, "Transport owner dropped");
        }
        self.wake.notify_one();
    }
}

/// Connector producing [`TcpTransport`]s that all wake the same event loop.
#[derive(Clone, Default)]
pub struct TcpConnector {
    wake: Arc<Notify>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notified whenever any transport from this connector has news.
    pub fn wake(&self) -> Arc<Notify> {
        self.wake.clone()
    }
}

impl Connector for TcpConnector {
    fn open(&self, host: &str, port: u16) -> Box<dyn Transport> {
        Box::new(TcpTransport::spawn(host, port, self.wake.clone()))
    }
}
