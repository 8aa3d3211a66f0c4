//! LinkWave protocol core.
//!
//! The moving parts of the client SDK: a persistent-connection lifecycle
//! state machine, lock-free sign generation for request correlation,
//! timeout-bounded request/response packets, the queue manager that
//! multiplexes packets over one connection, and the block allocator that
//! stitches fetched history pages into contiguous local ranges.
//!
//! UI, media, and REST surfaces live outside this crate and consume it
//! through the observer and caller boundaries.

pub mod block;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod idgen;
pub mod packet;
pub mod processors;
pub mod queue;
pub mod transport;

pub use block::MessageBlockAllocator;
pub use config::{ClientConfig, NetworkConfig};
pub use connection::{Connection, ConnectionObserver, ConnectionObservers, ConnectionState, SubscriptionId};
pub use error::{ProtocolError, Result};
pub use frame::{Frame, FrameKind};
pub use idgen::{derive_sequence, SignGenerator};
pub use packet::{codes, MessagePacket, PacketOutcome, PacketState};
pub use processors::{FrameProcessor, PresenceProcessor, PresenceUpdate};
pub use queue::MessageQueueManager;
pub use transport::{LoopbackTransport, Transport, TransportFactory};

/// Protocol wire version
pub const PROTOCOL_VERSION: u32 = 1;
