use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::events::{EventBus, PipelineEvent};

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created, `init` not yet successful
    #[default]
    Uninitialized,
    /// Accepting requests
    Ready,
    /// A flush was requested and has not finished yet
    Flushing,
    /// Shutdown in progress
    ShuttingDown,
    /// Session invalidated; only flush/shutdown are accepted (as no-ops)
    ShutDown,
}

impl LifecycleState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::ShutDown)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Flushing => "flushing",
            Self::ShuttingDown => "shutting_down",
            Self::ShutDown => "shut_down",
        };
        write!(f, "{}", name)
    }
}

/// Stored lifecycle state; publishes every change on the event bus
pub(crate) struct Lifecycle {
    state: RwLock<LifecycleState>,
    events: Arc<EventBus>,
}

impl Lifecycle {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            state: RwLock::new(LifecycleState::Uninitialized),
            events,
        }
    }

    pub fn get(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn set(&self, state: LifecycleState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!("Pipeline state: {} -> {}", previous, state);
            self.events.publish(PipelineEvent::StateChanged { state });
        }
    }
}
