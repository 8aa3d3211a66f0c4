//! Passive frame processors.
//!
//! Pushes arrive without any pending packet; the queue manager offers
//! them to a chain of processors after correlation fails. Exactly one
//! processor is expected to claim a frame; unclaimed frames are dropped
//! by the dispatcher.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::{Frame, FrameKind};

/// Consumer of frames no pending packet claimed.
pub trait FrameProcessor: Send + Sync {
    /// Processor name, for dispatch logging.
    fn name(&self) -> &str;

    /// Offer a frame; return true to consume it and stop the chain.
    fn process(&self, frame: &Frame) -> bool;
}

/// Presence push payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// User the update concerns
    pub user_id: String,
    /// Whether the user is now online
    pub online: bool,
}

/// Tracks contact presence from server pushes.
#[derive(Default)]
pub struct PresenceProcessor {
    online: RwLock<HashMap<String, bool>>,
}

impl PresenceProcessor {
    /// Create a presence processor
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known presence for `user_id`, if any push mentioned them.
    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.online.read().get(user_id).copied()
    }
}

impl FrameProcessor for PresenceProcessor {
    fn name(&self) -> &str {
        "presence"
    }

    fn process(&self, frame: &Frame) -> bool {
        if frame.kind != FrameKind::PresencePush {
            return false;
        }

        match bincode::deserialize::<PresenceUpdate>(&frame.payload) {
            Ok(update) => {
                debug!(user = %update.user_id, online = update.online, "presence update");
                self.online.write().insert(update.user_id, update.online);
                true
            }
            Err(e) => {
                // Claim the frame anyway: it was addressed to us but the
                // payload is unusable, which points at a version skew.
                warn!("undecodable presence push: {e}");
                true
            }
        }
    }
}
