//! Decode engine abstraction
//!
//! The pipeline never talks to a hardware decoder directly. It drives an
//! [`EngineSession`] created by a [`DecodeEngine`], and receives every
//! completion through the [`CompletionHandler`] registered at session
//! creation. Completions arrive on threads owned by the engine.
//!
//! ```text
//! Sequencer --submit--> EngineSession ==(engine thread)==> CompletionHandler
//!     |                                                         |
//!     +--wait_for_outstanding / invalidate                      v
//!                                                        Callback Bridge
//! ```

pub mod adapter;
pub mod simulated;

pub use adapter::DecodeEngineAdapter;
pub use simulated::{SimulatedEngine, SimulatedEngineConfig};

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{DecodeError, Result};
use crate::video::{FrameDescriptor, ImagePlane, PixelFormat, Resolution, Sample, StreamType};

/// Raw status code reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineStatus(pub i32);

impl EngineStatus {
    pub const OK: EngineStatus = EngineStatus(0);
    /// Generic decode failure for a single unit
    pub const BAD_DATA: EngineStatus = EngineStatus(-12909);
    /// The session was used after invalidation
    pub const INVALIDATED: EngineStatus = EngineStatus(-12903);
    /// The engine cannot decode this stream at all
    pub const UNSUPPORTED: EngineStatus = EngineStatus(-12906);
    /// The engine could not allocate session resources
    pub const ALLOCATION_FAILED: EngineStatus = EngineStatus(-12904);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self.0, self.0 as u32)
    }
}

/// Per-completion info flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeInfoFlags(u32);

impl DecodeInfoFlags {
    pub const NONE: DecodeInfoFlags = DecodeInfoFlags(0);
    /// The unit was decoded asynchronously
    pub const ASYNCHRONOUS: DecodeInfoFlags = DecodeInfoFlags(1 << 0);
    /// The engine dropped the unit without producing an image
    pub const FRAME_DROPPED: DecodeInfoFlags = DecodeInfoFlags(1 << 1);

    pub fn contains(&self, other: DecodeInfoFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for DecodeInfoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Sample payload wrapped for submission, with its timing attached
#[derive(Debug, Clone)]
pub struct TransportBuffer {
    pub data: Bytes,
    pub decode_ts_us: i64,
    pub composition_ts_us: i64,
    pub duration_us: i64,
}

impl TransportBuffer {
    /// Wrap a sample without copying its payload
    pub fn from_sample(sample: &Sample) -> Result<Self> {
        if sample.is_empty() {
            return Err(DecodeError::OutOfMemory(format!(
                "cannot create transport buffer for empty sample at dts {}us",
                sample.decode_ts_us
            )));
        }
        Ok(Self {
            data: sample.data.clone(),
            decode_ts_us: sample.decode_ts_us,
            composition_ts_us: sample.composition_ts_us,
            duration_us: sample.duration_us,
        })
    }
}

/// Image produced by the engine, before packaging
#[derive(Debug, Clone)]
pub struct EngineImage {
    pub size: Resolution,
    pub format: PixelFormat,
    pub planes: Vec<ImagePlane>,
}

/// One completion as delivered by the engine
#[derive(Debug)]
pub struct Completion {
    pub status: EngineStatus,
    pub flags: DecodeInfoFlags,
    pub image: Option<EngineImage>,
    /// The descriptor handed over with the submission, returned by value
    pub descriptor: FrameDescriptor,
}

/// Receives completions on engine-owned threads
pub trait CompletionHandler: Send + Sync {
    fn on_completion(&self, completion: Completion);
}

/// Result of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted; exactly one completion will follow
    Queued,
    /// Dropped synchronously; no completion will follow
    Dropped,
    /// Rejected; no completion will follow
    Failed(EngineStatus),
}

/// A live decode session
pub trait EngineSession: Send {
    fn submit(&mut self, buffer: TransportBuffer, descriptor: FrameDescriptor) -> SubmitOutcome;

    /// Block until every queued unit has been delivered
    fn wait_for_outstanding(&self) -> std::result::Result<(), EngineStatus>;

    /// Tear the session down. No completion is delivered afterwards.
    fn invalidate(&mut self) -> std::result::Result<(), EngineStatus>;

    fn is_hardware_accelerated(&self) -> Option<bool> {
        None
    }
}

/// Factory for decode sessions
pub trait DecodeEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_session(
        &self,
        format: &FormatDescription,
        handler: Arc<dyn CompletionHandler>,
    ) -> std::result::Result<Box<dyn EngineSession>, EngineStatus>;
}

/// Stream description handed to the engine at session creation
#[derive(Debug, Clone)]
pub struct FormatDescription {
    pub stream_type: StreamType,
    /// Coded picture size
    pub picture: Resolution,
    /// Codec configuration record
    pub extradata: Bytes,
    /// Requested output pixel format
    pub output_format: PixelFormat,
    pub prefer_hardware: bool,
}

impl FormatDescription {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let picture = config.stream.picture;
        if picture.is_empty() {
            return Err(DecodeError::Fatal(format!(
                "cannot describe {} stream with picture size {}",
                config.stream.stream_type, picture
            )));
        }

        Ok(Self {
            stream_type: config.stream.stream_type,
            picture,
            extradata: Bytes::from(config.stream.extradata.clone()),
            output_format: config.output_format(),
            prefer_hardware: config.output.prefer_hardware,
        })
    }
}
