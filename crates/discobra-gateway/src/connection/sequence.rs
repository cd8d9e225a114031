//! Last observed dispatch sequence number

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic sequence cell shared by the read loop and the heartbeat task
///
/// Sequence numbers start at 1, so 0 stands for "none seen yet".
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received sequence number; never moves backwards
    ///
    /// Returns the value now stored.
    pub fn observe(&self, seq: u64) -> u64 {
        self.0.fetch_max(seq, Ordering::AcqRel).max(seq)
    }

    /// Get the last sequence number, if any
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Forget the sequence (fresh identify)
    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}
