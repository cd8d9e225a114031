//! Heartbeat scheduler
//!
//! A task per connection that sends op 1 every interval. Each tick first
//! checks the ACK for the previous pulse: if it never arrived the task
//! reports one liveness failure and exits instead of sending into a dead
//! connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{Outbound, Sequence};
use crate::protocol::GatewayMessage;

/// Signal sent when a heartbeat went unacknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFailure;

/// ACK bookkeeping shared by the heartbeat task and the read loop
#[derive(Debug, Default)]
pub struct HeartbeatState {
    ack_pending: AtomicBool,
    last_sent: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

impl HeartbeatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pulse; returns `true` if the previous one was never acknowledged
    pub fn beat(&self) -> bool {
        let missed = self.ack_pending.swap(true, Ordering::AcqRel);
        if !missed {
            *self.last_sent.lock() = Some(Instant::now());
        }
        missed
    }

    /// Record a heartbeat ACK
    pub fn ack(&self) {
        self.ack_pending.store(false, Ordering::Release);
        if let Some(sent) = self.last_sent.lock().take() {
            *self.latency.lock() = Some(sent.elapsed());
        }
    }

    /// Check whether a pulse is awaiting its ACK
    pub fn is_ack_pending(&self) -> bool {
        self.ack_pending.load(Ordering::Acquire)
    }

    /// Round trip of the last acknowledged pulse
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }

    /// Clear pending state for a new connection; latency is kept
    pub fn reset(&self) {
        self.ack_pending.store(false, Ordering::Release);
        *self.last_sent.lock() = None;
    }
}

/// Handle to a running heartbeat task; the task stops when this is dropped
#[derive(Debug)]
pub struct Heartbeater {
    interval: Duration,
    handle: JoinHandle<()>,
}

impl Heartbeater {
    /// Start beating every `interval`, first pulse one full interval from now
    ///
    /// `interval` must be non-zero.
    pub fn spawn(
        interval: Duration,
        state: Arc<HeartbeatState>,
        sequence: Arc<Sequence>,
        outgoing: mpsc::Sender<Outbound>,
        failures: mpsc::Sender<HeartbeatFailure>,
    ) -> Self {
        state.reset();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if state.beat() {
                    tracing::warn!(
                        interval_ms = interval.as_millis() as u64,
                        "Heartbeat ACK not received, connection considered dead"
                    );
                    let _ = failures.send(HeartbeatFailure).await;
                    return;
                }

                let seq = sequence.get();
                tracing::trace!(seq = ?seq, "Sending heartbeat");
                if outgoing
                    .send(Outbound::Message(GatewayMessage::heartbeat(seq)))
                    .await
                    .is_err()
                {
                    // Writer gone; the connection is being torn down
                    return;
                }
            }
        });

        Self { interval, handle }
    }

    /// Get the interval this task beats at
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel the task and its pending timer
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Heartbeater {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
