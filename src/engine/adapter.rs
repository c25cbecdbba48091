use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    CompletionHandler, DecodeEngine, EngineSession, FormatDescription, SubmitOutcome,
    TransportBuffer,
};
use crate::error::{DecodeError, Result};
use crate::video::{FrameDescriptor, Sample};

/// Owns the engine session and its format description
///
/// All calls come from the command sequencer (or the blocking pool on its
/// behalf), so the adapter itself needs no internal locking.
pub struct DecodeEngineAdapter {
    engine: Arc<dyn DecodeEngine>,
    format: Option<FormatDescription>,
    session: Option<Box<dyn EngineSession>>,
    hardware: Option<bool>,
}

impl DecodeEngineAdapter {
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        Self {
            engine,
            format: None,
            session: None,
            hardware: None,
        }
    }

    /// Create the engine session and register the completion handler
    pub fn initialize(
        &mut self,
        format: FormatDescription,
        handler: Arc<dyn CompletionHandler>,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(DecodeError::InvalidState(
                "engine session already created".to_string(),
            ));
        }

        let session = self.engine.create_session(&format, handler).map_err(|status| {
            DecodeError::Fatal(format!(
                "{} failed to create {} session: {}",
                self.engine.name(),
                format.stream_type,
                status
            ))
        })?;

        self.hardware = session.is_hardware_accelerated();
        info!(
            "{} session created: {} {} -> {} (hardware: {:?})",
            self.engine.name(),
            format.stream_type,
            format.picture,
            format.output_format,
            self.hardware
        );

        self.format = Some(format);
        self.session = Some(session);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn format(&self) -> Option<&FormatDescription> {
        self.format.as_ref()
    }

    pub fn is_hardware_accelerated(&self) -> Option<bool> {
        self.hardware
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Wrap the sample and hand it to the engine with a fresh descriptor
    pub fn submit(&mut self, sample: &Sample) -> Result<SubmitOutcome> {
        let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;
        let buffer = TransportBuffer::from_sample(sample)?;
        let descriptor = FrameDescriptor::from(sample);

        let outcome = session.submit(buffer, descriptor);
        debug!(
            "Submitted sample dts={}us pts={}us ({} bytes): {:?}",
            sample.decode_ts_us,
            sample.composition_ts_us,
            sample.len(),
            outcome
        );
        Ok(outcome)
    }

    /// Block until every queued unit has been delivered
    pub fn wait_for_outstanding(&self) -> Result<()> {
        let session = self.session.as_ref().ok_or(DecodeError::NotInitialized)?;
        session
            .wait_for_outstanding()
            .map_err(|status| DecodeError::engine(status, "wait_for_outstanding"))
    }

    /// Settle, invalidate and release everything. Errors are logged only.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(status) = session.wait_for_outstanding() {
                warn!("Engine settle-wait failed during shutdown: {}", status);
            }
            if let Err(status) = session.invalidate() {
                warn!("Engine session invalidation failed: {}", status);
            }
            info!("{} session invalidated", self.engine.name());
        }
        self.format = None;
    }
}

impl Drop for DecodeEngineAdapter {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("Engine adapter dropped with a live session, shutting down");
            self.shutdown();
        }
    }
}
