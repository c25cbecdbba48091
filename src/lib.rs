//! hwdec-pipeline - asynchronous hardware video decode with ordered output
//!
//! Compressed samples go in one at a time; a decode engine completes them on
//! its own threads, possibly out of order; frames come back out in a stable
//! order through a bounded reorder window.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod telemetry;
pub mod utils;
pub mod video;

pub use config::{ConfigStore, PipelineConfig};
pub use decoder::{DecodePipeline, DecodePipelineBuilder, LifecycleState, PipelineStats};
pub use engine::{DecodeEngine, SimulatedEngine, SimulatedEngineConfig};
pub use error::{DecodeError, ErrorKind, Result};
pub use events::{EventBus, PipelineEvent};
pub use video::{DecodedFrame, Sample};
