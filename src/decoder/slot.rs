use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::video::DecodedFrame;

pub(crate) type ResultSender = oneshot::Sender<Result<Vec<DecodedFrame>>>;

/// The single outstanding decode result
#[derive(Default)]
pub(crate) struct PendingResult {
    sender: Option<ResultSender>,
}

impl PendingResult {
    /// Install a sender; hands it back if one is already outstanding
    pub fn install(&mut self, sender: ResultSender) -> std::result::Result<(), ResultSender> {
        if self.sender.is_some() {
            return Err(sender);
        }
        self.sender = Some(sender);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.sender.is_some()
    }

    /// Resolve with `frames`. Returns false if nothing was pending.
    pub fn resolve(&mut self, frames: Vec<DecodedFrame>) -> bool {
        self.complete(Ok(frames))
    }

    /// Reject with `error`. Returns false if nothing was pending.
    pub fn reject(&mut self, error: DecodeError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&mut self, result: Result<Vec<DecodedFrame>>) -> bool {
        match self.sender.take() {
            Some(sender) => {
                if sender.send(result).is_err() {
                    debug!("Decode result dropped: caller no longer waiting");
                }
                true
            }
            None => false,
        }
    }
}
