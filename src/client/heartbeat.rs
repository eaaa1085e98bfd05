//! Two independent heart-beat timers, one per direction.
//!
//! Each timer only ever computes "how long until I'm due" and sleeps that
//! long; it never assumes it fired exactly on schedule, so a burst of
//! outbound traffic that updates `lastSent` while the client timer sleeps
//! is free to push its next wakeup back out. Matches §9's description of
//! `remaining = max(0, threshold * period_ms - elapsed)`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ClientInner;
use crate::config::HeartbeatThresholds;

#[derive(Debug, Clone, Copy)]
pub enum HeartbeatEvent {
    /// The client-side timer is due: emit an outbound heart-beat byte.
    ClientTick,
    /// The server-side timer is due: no bytes arrived in time, the
    /// connection is dead.
    ServerTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Client,
    Server,
}

/// Owns the two background tasks for a connected session. Dropping it (or
/// calling `stop`) aborts both.
pub struct HeartbeatTimers {
    client_task: Option<JoinHandle<()>>,
    server_task: Option<JoinHandle<()>>,
}

impl HeartbeatTimers {
    /// Start whichever timers the negotiated `heart_beats` periods call
    /// for. A zero period on either side means that direction isn't used.
    pub fn start(
        inner: Arc<ClientInner>,
        heart_beats: (u64, u64),
        thresholds: HeartbeatThresholds,
        events: mpsc::UnboundedSender<HeartbeatEvent>,
    ) -> Self {
        let client_task = if heart_beats.0 > 0 {
            Some(tokio::spawn(run_timer(inner.clone(), heart_beats.0, thresholds.client, Direction::Client, events.clone())))
        } else {
            None
        };
        let server_task = if heart_beats.1 > 0 {
            Some(tokio::spawn(run_timer(inner, heart_beats.1, thresholds.server, Direction::Server, events)))
        } else {
            None
        };
        HeartbeatTimers { client_task, server_task }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.client_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.server_task.take() {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatTimers {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(inner: Arc<ClientInner>, period_ms: u64, threshold: f64, direction: Direction, events: mpsc::UnboundedSender<HeartbeatEvent>) {
    let threshold_ms = (threshold * period_ms as f64) as u64;
    loop {
        let last = match direction {
            Direction::Client => inner.last_sent_ms(),
            Direction::Server => inner.last_received_ms(),
        };
        let elapsed = inner.now_ms().saturating_sub(last);
        let remaining = threshold_ms.saturating_sub(elapsed);
        if remaining > 0 {
            tokio::time::sleep(Duration::from_millis(remaining)).await;
            continue;
        }
        match direction {
            Direction::Client => {
                if events.send(HeartbeatEvent::ClientTick).is_err() {
                    return;
                }
                // lastSent won't move until the run loop actually writes the
                // byte; give it a moment rather than busy-spinning.
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Direction::Server => {
                let _ = events.send(HeartbeatEvent::ServerTimeout);
                return;
            }
        }
    }
}
