//! Connection lifecycle state machine.
//!
//! One [`Connection`] owns one physical transport session. States move
//! strictly forward (`Idle → Connecting → Connected → Closed`); a
//! backward attempt is a programming-error fault, never silently
//! ignored. A reconnect discards the old connection and constructs a
//! new one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use linkwave_core::Timestamp;

use crate::error::{ProtocolError, Result};
use crate::transport::Transport;

/// Connection lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, nothing started
    Idle,
    /// Socket establishment in progress
    Connecting,
    /// Ready to send and receive
    Connected,
    /// Torn down; this connection is never reused
    Closed,
}

impl ConnectionState {
    /// Whether this state admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{name}")
    }
}

/// Outcome of validating a transition request
enum Transition {
    /// Same state; accepted with no effect
    NoOp,
    /// Valid forward move
    Forward,
    /// Invalid move; programming defect
    Fault,
}

fn validate_transition(from: ConnectionState, to: ConnectionState) -> Transition {
    use ConnectionState::*;
    match (from, to) {
        (a, b) if a == b => Transition::NoOp,
        (Idle, Connecting) | (Connecting, Connected) => Transition::Forward,
        // close() is valid from any state.
        (Idle, Closed) | (Connecting, Closed) | (Connected, Closed) => Transition::Forward,
        _ => Transition::Fault,
    }
}

/// Identifier of one observer subscription
pub type SubscriptionId = u64;

/// Observer of connection state changes.
///
/// Invoked after the state lock is released; implementations must not
/// block the transition path.
pub trait ConnectionObserver: Send + Sync {
    /// Called once per accepted transition with the old and new state.
    fn on_state_changed(&self, old: ConnectionState, new: ConnectionState);
}

/// Subscribe/unsubscribe registry for state-change observers.
///
/// Outlives any single connection so observers survive reconnects;
/// teardown is explicit via [`unsubscribe`](Self::unsubscribe), not
/// weak references.
#[derive(Default)]
pub struct ConnectionObservers {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<SubscriptionId, Arc<dyn ConnectionObserver>>>,
}

impl ConnectionObservers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; the returned id is the unsubscribe handle.
    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, observer);
        id
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.write().remove(&id);
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no observers are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn notify(&self, old: ConnectionState, new: ConnectionState) {
        // Snapshot under the read lock, invoke outside it.
        let listeners: Vec<_> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener.on_state_changed(old, new);
        }
    }
}

/// One physical transport session and its lifecycle state.
pub struct Connection {
    state: RwLock<ConnectionState>,
    transport: Arc<dyn Transport>,
    observers: Arc<ConnectionObservers>,
    created_at: Timestamp,
}

impl Connection {
    /// Create a connection over `transport` in the `Idle` state.
    pub fn new(transport: Arc<dyn Transport>, observers: Arc<ConnectionObservers>) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Idle),
            transport,
            observers,
            created_at: Timestamp::now(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// When this connection was constructed
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Begin socket establishment: `Idle → Connecting`, then
    /// `Connecting → Connected` once the transport reports open. An
    /// open failure lands the connection in `Closed`. A concurrent
    /// `close()` while the socket is opening aborts the attempt.
    pub fn connect(&self) -> Result<()> {
        self.transition(ConnectionState::Connecting)?;

        match self.transport.open() {
            Ok(()) => {
                if !self.try_commit_connected()? {
                    // close() won the race while the transport was
                    // opening; it already tore the state down.
                    self.transport.close();
                    return Err(ProtocolError::NotConnected(
                        ConnectionState::Closed.to_string(),
                    ));
                }
                info!("connection established");
                Ok(())
            }
            Err(e) => {
                warn!("transport open failed: {e}");
                self.close();
                Err(e)
            }
        }
    }

    /// Send one encoded frame. Valid only while `Connected`; in any
    /// other state the send is rejected, never silently dropped.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(ProtocolError::NotConnected(state.to_string()));
        }
        self.transport.write(bytes)
    }

    /// Tear down from any state. Idempotent; always lands in `Closed`.
    pub fn close(&self) {
        {
            let state = self.state.read();
            if *state == ConnectionState::Closed {
                return;
            }
        }
        self.transport.close();
        // Closed is reachable from every state, so this cannot fault.
        let _ = self.transition(ConnectionState::Closed);
    }

    /// `Connecting → Connected`, unless a concurrent `close()` already
    /// landed the connection in `Closed`; returns false in that case.
    /// `close()` is valid from any state, so losing that race is not a
    /// fault.
    fn try_commit_connected(&self) -> Result<bool> {
        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Connecting => *state = ConnectionState::Connected,
                ConnectionState::Closed => return Ok(false),
                other => {
                    debug_assert!(false, "invalid connection transition {other} -> Connected");
                    return Err(ProtocolError::StateFault(format!(
                        "invalid connection transition {other} -> Connected"
                    )));
                }
            }
        }

        debug!("connection state Connecting -> Connected");
        self.observers
            .notify(ConnectionState::Connecting, ConnectionState::Connected);
        Ok(true)
    }

    /// Commit a state transition and notify observers outside the lock.
    fn transition(&self, to: ConnectionState) -> Result<()> {
        let old = {
            let mut state = self.state.write();
            let from = *state;
            match validate_transition(from, to) {
                Transition::NoOp => return Ok(()),
                Transition::Forward => {
                    *state = to;
                    from
                }
                Transition::Fault => {
                    debug_assert!(false, "invalid connection transition {from} -> {to}");
                    return Err(ProtocolError::StateFault(format!(
                        "invalid connection transition {from} -> {to}"
                    )));
                }
            }
        };

        debug!("connection state {old} -> {to}");
        self.observers.notify(old, to);
        Ok(())
    }
}
