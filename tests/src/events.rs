//! Recording of reload events

use hotweave_kernel::ReloadEvent;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Collects events from an engine subscription for later assertions
pub struct EventRecorder {
    rx: broadcast::Receiver<ReloadEvent>,
    seen: Vec<ReloadEvent>,
}

impl EventRecorder {
    pub fn new(rx: broadcast::Receiver<ReloadEvent>) -> Self {
        Self { rx, seen: Vec::new() }
    }

    /// Pull everything already delivered and return the full history
    pub fn drain(&mut self) -> &[ReloadEvent] {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.seen.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Event recorder lagged by {} event(s)", skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        &self.seen
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&mut self, predicate: impl Fn(&ReloadEvent) -> bool) -> usize {
        self.drain().iter().filter(|e| predicate(e)).count()
    }

    /// Wait until an event matching `predicate` arrives
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        predicate: impl Fn(&ReloadEvent) -> bool,
    ) -> Option<ReloadEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            };
            self.seen.push(event.clone());
            if predicate(&event) {
                return Some(event);
            }
        }
    }
}
