//! Message queue manager.
//!
//! The orchestrator between callers, the connection, and inbound
//! frames: it mints a sign per request, registers the packet in the
//! pending map, pushes the encoded frame onto the connection, schedules
//! the packet timeout, and routes every inbound frame to the
//! correlating packet or the passive processor chain.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use linkwave_core::Sign;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::frame::Frame;
use crate::idgen::SignGenerator;
use crate::packet::{codes, MessagePacket};
use crate::processors::FrameProcessor;

/// Multiplexes pending request packets over one connection.
pub struct MessageQueueManager {
    config: ClientConfig,
    signs: Arc<SignGenerator>,
    connection: Arc<Connection>,
    /// Sign → pending packet; dispatch-then-remove keeps correlation
    /// lookups O(1) and atomic.
    pending: DashMap<Sign, Arc<MessagePacket>>,
    processors: RwLock<Vec<Arc<dyn FrameProcessor>>>,
}

impl MessageQueueManager {
    /// Create a manager bound to `connection`. A reconnect constructs a
    /// fresh connection and a fresh manager; stale packets never carry
    /// over.
    pub fn new(
        config: ClientConfig,
        signs: Arc<SignGenerator>,
        connection: Arc<Connection>,
    ) -> Self {
        Self {
            config,
            signs,
            connection,
            pending: DashMap::new(),
            processors: RwLock::new(Vec::new()),
        }
    }

    /// The connection this manager sends over
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Append a passive processor to the dispatch chain.
    pub fn add_processor(&self, processor: Arc<dyn FrameProcessor>) {
        self.processors.write().push(processor);
    }

    /// Number of requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a packet with `sign` is still addressable
    pub fn is_pending(&self, sign: Sign) -> bool {
        self.pending.contains_key(&sign)
    }

    /// Submit a request. The returned packet has either been placed on
    /// the wire (`WaitResult`, timeout scheduled) or already failed
    /// with an enqueue error; the caller awaits it either way.
    pub fn submit(self: &Arc<Self>, payload: Vec<u8>) -> Result<Arc<MessagePacket>> {
        let sign = self.signs.next_sign();
        let timeout = self.config.network.packet_timeout();
        let packet = Arc::new(MessagePacket::new(sign, payload, timeout));

        let frame = Frame::request(sign, packet.request().to_vec());
        let bytes = frame.encode()?;

        // Register and mark WaitResult before sending: the reader side
        // may dispatch the response before send() even returns, and it
        // must find a packet that accepts it.
        self.pending.insert(sign, packet.clone());
        packet.mark_wait_result();

        match self.connection.send(&bytes) {
            Ok(()) => {
                debug!(%sign, "request enqueued");
                self.schedule_timeout(sign, packet.clone());
            }
            Err(e) => {
                self.pending.remove(&sign);
                warn!(%sign, "enqueue failed: {e}");
                packet.on_enqueue_failure(codes::ERR_ENQUEUE, e.to_string());
            }
        }

        Ok(packet)
    }

    /// Route one inbound decoded frame: the correlating packet first,
    /// then the processor chain. An unclaimed frame is logged and
    /// dropped; that alone is not an error but can indicate a
    /// protocol/version mismatch.
    pub fn dispatch(&self, frame: Frame) {
        if MessagePacket::accepts_kind(frame.kind) {
            if let Some(entry) = self.pending.get(&frame.sign) {
                let packet = entry.value().clone();
                drop(entry);
                if packet.try_accept(&frame) {
                    self.pending.remove(&frame.sign);
                    return;
                }
            }
        }

        for processor in self.processors.read().iter() {
            if processor.process(&frame) {
                debug!(sign = %frame.sign, processor = processor.name(), "frame consumed");
                return;
            }
        }

        debug!(
            sign = %frame.sign,
            kind = ?frame.kind,
            "no packet or processor claimed frame; dropping"
        );
    }

    /// Fail every pending packet, e.g. when the connection closes.
    pub fn fail_all_pending(&self, code: u32, message: &str) {
        let signs: Vec<Sign> = self.pending.iter().map(|e| *e.key()).collect();
        if signs.is_empty() {
            return;
        }
        info!(count = signs.len(), "failing all pending packets: {message}");
        for sign in signs {
            if let Some((_, packet)) = self.pending.remove(&sign) {
                packet.fail(code, message.to_string());
            }
        }
    }

    /// Age out a packet when its deadline elapses.
    fn schedule_timeout(self: &Arc<Self>, sign: Sign, packet: Arc<MessagePacket>) {
        let manager = Arc::downgrade(self);
        let timeout = packet.timeout();
        tokio::spawn(async move {
            sleep(timeout).await;
            if packet.on_timeout() {
                if let Some(manager) = manager.upgrade() {
                    manager.pending.remove(&sign);
                }
            }
        });
    }
}
