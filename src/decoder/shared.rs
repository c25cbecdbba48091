use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::reorder::ReorderBuffer;
use super::slot::{PendingResult, ResultSender};
use super::stats::{PipelineStats, StatsCounters};
use crate::config::ReorderKey;
use crate::error::DecodeError;
use crate::events::{EventBus, PipelineEvent};
use crate::video::{DecodedFrame, FrameDescriptor};

/// Everything guarded by the pipeline lock
pub(crate) struct DecodeState {
    pub pending: PendingResult,
    pub reorder: ReorderBuffer,
    pub seek_threshold: Option<i64>,
}

impl DecodeState {
    /// Whether a completion ending before the seek target becomes a
    /// placeholder. Reaching the target clears it.
    pub fn suppress(&mut self, descriptor: &FrameDescriptor) -> bool {
        match self.seek_threshold {
            Some(threshold) if descriptor.end_ts_us() < threshold => true,
            Some(threshold) => {
                debug!(
                    "Seek target {}us reached at pts={}us",
                    threshold, descriptor.composition_ts_us
                );
                self.seek_threshold = None;
                false
            }
            None => false,
        }
    }
}

/// State shared by the command sequencer and the callback bridge
pub(crate) struct SharedState {
    state: Mutex<DecodeState>,
    /// Set synchronously by `flush`, cleared by the sequencer
    flushing: AtomicBool,
    /// Set once the session is invalidated
    closed: AtomicBool,
    window: usize,
    pub stats: StatsCounters,
    pub events: Arc<EventBus>,
}

impl SharedState {
    pub fn new(window: usize, key: ReorderKey, events: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(DecodeState {
                pending: PendingResult::default(),
                reorder: ReorderBuffer::new(key),
                seek_threshold: None,
            }),
            flushing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            window,
            stats: StatsCounters::default(),
            events,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DecodeState> {
        self.state.lock()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    pub fn set_flushing(&self, flushing: bool) {
        self.flushing.store(flushing, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn install(&self, sender: ResultSender) -> Result<(), ResultSender> {
        self.lock().pending.install(sender)
    }

    fn resolve_ready_locked(&self, state: &mut DecodeState) {
        if !state.pending.is_pending() {
            return;
        }
        let frames = state.reorder.pop_ready(self.window);
        let count = frames.len();
        if state.pending.resolve(frames) {
            StatsCounters::add(&self.stats.frames_emitted, count);
        }
    }

    /// Resolve the pending result with whatever the window releases
    pub fn resolve_ready(&self) {
        let mut state = self.lock();
        self.resolve_ready_locked(&mut state);
    }

    /// Buffer a frame and resolve. Discards the frame if a flush started.
    pub fn push_and_resolve(&self, frame: DecodedFrame) -> bool {
        let mut state = self.lock();
        if self.is_flushing() {
            return false;
        }
        state.reorder.push(frame);
        self.resolve_ready_locked(&mut state);
        true
    }

    /// Reject the pending result, if any
    pub fn reject_pending(&self, error: DecodeError) -> bool {
        let cancelled = error.is_cancelled();
        let rejected = self.lock().pending.reject(error);
        if rejected && cancelled {
            StatsCounters::inc(&self.stats.requests_cancelled);
        }
        rejected
    }

    /// Count and publish a per-request failure, then reject with it
    pub fn fail_pending(&self, error: DecodeError) -> bool {
        StatsCounters::inc(&self.stats.decode_errors);
        self.events.publish(PipelineEvent::DecodeError {
            status: error.status().map(|s| s.0),
            message: error.to_string(),
        });
        self.reject_pending(error)
    }

    /// Release every buffered frame in order
    pub fn drain(&self) -> Vec<DecodedFrame> {
        let frames = self.lock().reorder.drain_all();
        StatsCounters::add(&self.stats.frames_emitted, frames.len());
        frames
    }

    /// Drop every buffered frame and the seek target
    pub fn discard(&self) -> usize {
        let mut state = self.lock();
        state.seek_threshold = None;
        state.reorder.clear()
    }

    pub fn set_seek_threshold(&self, threshold: Option<i64>) {
        self.lock().seek_threshold = threshold;
    }

    pub fn stats(&self) -> PipelineStats {
        let buffered = self.lock().reorder.len();
        self.stats.snapshot(buffered)
    }
}
