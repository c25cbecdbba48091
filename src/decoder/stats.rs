use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub samples_submitted: u64,
    pub frames_dropped: u64,
    pub frames_decoded: u64,
    pub placeholders: u64,
    pub frames_emitted: u64,
    pub decode_errors: u64,
    pub requests_cancelled: u64,
    /// Frames currently held in the reorder buffer
    pub buffered: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    pub samples_submitted: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub placeholders: AtomicU64,
    pub frames_emitted: AtomicU64,
    pub decode_errors: AtomicU64,
    pub requests_cancelled: AtomicU64,
}

impl StatsCounters {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, buffered: usize) -> PipelineStats {
        PipelineStats {
            samples_submitted: self.samples_submitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
            buffered: buffered as u64,
        }
    }
}
