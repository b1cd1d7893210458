//! KATCP channels for CMC and array connections.
//!
//! Provides the protocol plumbing shared by every upstream connection:
//! - `Message` / `MessageQueue`: word-list requests and their FIFO
//! - `KatcpCodec`: line framing and escaping
//! - `Transport` / `Connector`: non-blocking socket handles (tokio TCP in production)
//! - `Channel`: the send/wait/monitor state machine with one request in flight
//! - `testing` (feature `test-util`): scripted in-memory transports for exercising
//!   channels without sockets

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod queue;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;

pub use channel::{Channel, ChannelEvent, ChannelRole, ChannelState, ChannelStats, Multiplexed};
pub use codec::KatcpCodec;
pub use error::{KatcpError, KatcpResult};
pub use message::{Message, MessageKind};
pub use queue::MessageQueue;
pub use transport::{Connector, SendProgress, TcpConnector, TcpTransport, Transport, TransportEvent};
