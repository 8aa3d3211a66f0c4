//! Request/response correlation packets.
//!
//! One [`MessagePacket`] is one outstanding request, keyed by its sign.
//! Its state machine is `Created → WaitResult → {Success | Fail}`. All
//! mutation happens under the packet's own lock; the first path to
//! commit a terminal state wins, and terminal states absorb every later
//! event.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use linkwave_core::{Sign, Timestamp};

use crate::error::{ProtocolError, Result};
use crate::frame::{Frame, FrameKind};

/// Well-known client-side error codes carried by failed packets.
/// Server codes pass through verbatim from the frame status.
pub mod codes {
    /// Request could not be handed to the transport
    pub const ERR_ENQUEUE: u32 = 1001;
    /// No matching response within the packet timeout
    pub const ERR_TIMEOUT: u32 = 1002;
    /// Connection closed while the request was pending
    pub const ERR_CONN_CLOSED: u32 = 1003;
}

/// Packet lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketState {
    /// Built, not yet on the wire
    Created,
    /// Sent; awaiting the correlated response
    WaitResult,
    /// Response arrived with zero status
    Success,
    /// Failed: enqueue error, server error, or timeout
    Fail,
}

impl PacketState {
    /// Whether this state admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, PacketState::Success | PacketState::Fail)
    }
}

/// Terminal result a waiter observes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Response payload
    Success(Vec<u8>),
    /// Error code and message; client codes are in [`codes`],
    /// everything else is server-supplied
    Fail { code: u32, message: String },
}

struct PacketInner {
    state: PacketState,
    response: Vec<u8>,
    error_code: u32,
    error_message: String,
}

/// One outstanding request awaiting its correlated response.
pub struct MessagePacket {
    sign: Sign,
    request: Vec<u8>,
    timeout: Duration,
    created_at: Timestamp,
    inner: Mutex<PacketInner>,
    done: Notify,
}

impl MessagePacket {
    /// Create a packet for `request` correlated by `sign`.
    pub fn new(sign: Sign, request: Vec<u8>, timeout: Duration) -> Self {
        Self {
            sign,
            request,
            timeout,
            created_at: Timestamp::now(),
            inner: Mutex::new(PacketInner {
                state: PacketState::Created,
                response: Vec::new(),
                error_code: 0,
                error_message: String::new(),
            }),
            done: Notify::new(),
        }
    }

    /// Correlation sign
    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Outbound payload
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// Response timeout configured for this packet
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the packet was created
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Current lifecycle state
    pub fn state(&self) -> PacketState {
        self.inner.lock().state
    }

    /// Error code and message, set only after a failure.
    pub fn error(&self) -> Option<(u32, String)> {
        let inner = self.inner.lock();
        match inner.state {
            PacketState::Fail => Some((inner.error_code, inner.error_message.clone())),
            _ => None,
        }
    }

    /// Mark the packet as awaiting its response: `Created →
    /// WaitResult`. Committed before the bytes reach the wire, so a
    /// response can never outrun the state.
    pub(crate) fn mark_wait_result(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PacketState::Created {
            inner.state = PacketState::WaitResult;
        }
    }

    /// The transport could not dispatch the send at all; fails the
    /// packet, synchronously unblocking any waiter.
    pub fn on_enqueue_failure(&self, code: u32, message: impl Into<String>) {
        self.fail(code, message.into());
    }

    /// Offer a decoded frame. Returns true only when the frame's sign
    /// matches and the packet is in `WaitResult`; a sign match in any
    /// other state is a duplicate/late response (or a logic defect) and
    /// is rejected without re-triggering the terminal transition.
    pub fn try_accept(&self, frame: &Frame) -> bool {
        if frame.sign != self.sign {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.state != PacketState::WaitResult {
            warn!(
                sign = %self.sign,
                state = ?inner.state,
                "response for packet not awaiting a result; rejecting"
            );
            return false;
        }

        if frame.is_ok() {
            inner.state = PacketState::Success;
            inner.response = frame.payload.clone();
        } else {
            inner.state = PacketState::Fail;
            inner.error_code = frame.status;
            inner.error_message = frame
                .message
                .clone()
                .unwrap_or_else(|| "server error".to_string());
        }
        drop(inner);

        self.done.notify_waiters();
        true
    }

    /// The deadline elapsed. Fails the packet only if it is still in
    /// `WaitResult`; a race with a just-arrived response is resolved by
    /// whoever takes the lock first. Returns whether the timeout fired.
    pub fn on_timeout(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            // State re-checked under the lock: the response may have
            // committed between the timer firing and this call.
            if inner.state != PacketState::WaitResult {
                return false;
            }
            inner.state = PacketState::Fail;
            inner.error_code = codes::ERR_TIMEOUT;
            inner.error_message = format!("no response within {:?}", self.timeout);
        }
        debug!(sign = %self.sign, "packet timed out");
        self.done.notify_waiters();
        true
    }

    /// Fail the packet unless it is already terminal.
    pub(crate) fn fail(&self, code: u32, message: String) {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = PacketState::Fail;
            inner.error_code = code;
            inner.error_message = message;
        }
        self.done.notify_waiters();
    }

    /// Terminal outcome, if one has been committed.
    pub fn outcome(&self) -> Option<PacketOutcome> {
        let inner = self.inner.lock();
        match inner.state {
            PacketState::Success => Some(PacketOutcome::Success(inner.response.clone())),
            PacketState::Fail => Some(PacketOutcome::Fail {
                code: inner.error_code,
                message: inner.error_message.clone(),
            }),
            _ => None,
        }
    }

    /// Wait until the packet reaches a terminal state, bounded by the
    /// caller-side safety net `limit`. Giving up here does not cancel
    /// the packet; it still resolves and is discarded by its owner.
    pub async fn wait(&self, limit: Duration) -> Result<PacketOutcome> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            // Register interest before checking state so a terminal
            // transition between the check and the await still wakes us.
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return Ok(outcome);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(ProtocolError::Timeout(limit));
            }
        }
    }

    /// Convenience for tests and the dispatcher: whether a frame of
    /// this kind could ever be a response.
    pub(crate) fn accepts_kind(kind: FrameKind) -> bool {
        kind == FrameKind::Response
    }
}
