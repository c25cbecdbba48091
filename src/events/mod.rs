//! Pipeline event bus
//!
//! Lifecycle changes and per-request failures are broadcast so that a host
//! application can observe the pipeline without polling it.

pub mod types;

pub use types::PipelineEvent;

use tokio::sync::broadcast;

/// Ring buffer size of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Broadcast bus for [`PipelineEvent`]s
///
/// Publishing never blocks and never fails. A subscriber that falls behind
/// gets `Lagged` and misses events.
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
