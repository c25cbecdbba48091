use thiserror::Error;

use crate::engine::EngineStatus;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Fatal initialization error: {0}")]
    Fatal(String),

    #[error("Decode error [{context}] (status: {status})")]
    Decode {
        status: EngineStatus,
        context: String,
    },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Image packaging failed: {0}")]
    ImagePackaging(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Decoder not initialized")]
    NotInitialized,

    #[error("Decoder is shut down")]
    Closed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`DecodeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pipeline never became usable; not retryable
    Fatal,
    /// Only the current request failed; the pipeline stays usable
    Transient,
    /// The request was abandoned by a flush or shutdown; not a failure
    Cancelled,
    /// The caller violated the request contract or used a closed pipeline
    Usage,
}

impl DecodeError {
    /// Wrap an engine status with the operation that produced it
    pub fn engine(status: EngineStatus, context: impl Into<String>) -> Self {
        Self::Decode {
            status,
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fatal(_) | Self::Config(_) => ErrorKind::Fatal,
            Self::Decode { .. }
            | Self::OutOfMemory(_)
            | Self::ImagePackaging(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::Transient,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NotInitialized | Self::Closed | Self::InvalidState(_) => ErrorKind::Usage,
        }
    }

    /// Cancellation must not be surfaced to users as a failure
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Engine status code carried by this error, if any
    pub fn status(&self) -> Option<EngineStatus> {
        match self {
            Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DecodeError>;
