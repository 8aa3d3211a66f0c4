//! Sign generation and sequence derivation.
//!
//! Signs correlate one outgoing request to its response; they must never
//! repeat within a process even under unbounded concurrent generation,
//! and a later call never returns a smaller value. Sequences are derived
//! per scope from a sign and order locally stored records.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use linkwave_core::{Scope, Sequence, Sign};

/// Low-order bits of a sign reserved for the collision counter; the
/// upper bits carry the wall-clock millisecond timestamp.
const COUNTER_BITS: u32 = 16;

/// Process-wide generator of unique, weakly time-ordered signs.
///
/// A single atomic holds the last issued value. Each call proposes
/// `now_millis << COUNTER_BITS`; when the clock has not advanced past
/// the last issue (same millisecond, or time went backward), the
/// counter-only path issues `last + 1` instead. Either way the CAS
/// commits a strictly larger value, so no two calls ever observe the
/// same sign. The critical section is one compare-exchange.
pub struct SignGenerator {
    last: AtomicU64,
}

impl SignGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Mint the next sign. Never fails, never repeats.
    pub fn next_sign(&self) -> Sign {
        loop {
            let last = self.last.load(Ordering::Acquire);
            let proposed = (now_millis() << COUNTER_BITS).max(last + 1);
            if self
                .last
                .compare_exchange_weak(last, proposed, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Sign::from_raw(proposed);
            }
        }
    }
}

impl Default for SignGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Derive the local ordering sequence for `sign` within `scope`.
///
/// Pure: no shared state, stable for fixed inputs. The scope
/// discriminator is hashed with a domain label and its low byte folded
/// into the sign's low byte. For a fixed scope that mapping is a
/// bijection of signs, so per-scope uniqueness and cross-millisecond
/// ordering carry over from the sign.
pub fn derive_sequence(sign: Sign, scope: &Scope) -> Sequence {
    let mut hasher = Sha256::new();
    hasher.update(b"LinkWave_ScopeSequence_v1");
    hasher.update(scope.discriminator_bytes());
    let digest = hasher.finalize();
    Sequence::from_raw(sign.as_u64() ^ u64::from(digest[0]))
}
