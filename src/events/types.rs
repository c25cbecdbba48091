//! Pipeline event types

use serde::{Deserialize, Serialize};

use crate::decoder::LifecycleState;

/// Events published by a decode pipeline
///
/// Serialized with a dotted event name and the payload under `data`:
///
/// ```json
/// { "event": "pipeline.state_changed", "data": { "state": "ready" } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// Lifecycle state changed
    #[serde(rename = "pipeline.state_changed")]
    StateChanged { state: LifecycleState },

    /// A request failed with an engine or packaging error
    #[serde(rename = "pipeline.decode_error")]
    DecodeError {
        /// Engine status code, when the engine reported one
        status: Option<i32>,
        message: String,
    },

    /// A flush completed
    #[serde(rename = "pipeline.flushed")]
    Flushed {
        /// Buffered frames discarded by the flush
        discarded: usize,
    },

    /// A drain completed
    #[serde(rename = "pipeline.drained")]
    Drained {
        /// Frames returned by the drain
        frames: usize,
    },
}

impl PipelineEvent {
    /// Dotted event name, as used in the serialized form
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "pipeline.state_changed",
            Self::DecodeError { .. } => "pipeline.decode_error",
            Self::Flushed { .. } => "pipeline.flushed",
            Self::Drained { .. } => "pipeline.drained",
        }
    }
}
