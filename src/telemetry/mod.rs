//! Decode performance telemetry
//!
//! Measurements are keyed by decode timestamp: `start` opens one when a
//! sample is submitted, `record` closes it when the frame comes back, and
//! `record_until` closes every measurement at or below a key (a flush
//! passes `i64::MAX`). Recorders are fire-and-forget and never fail.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::video::{ColorInfo, PixelFormat, Resolution, StreamType};

/// Context captured when a sample is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStart {
    pub stream_type: StreamType,
    pub keyframe: bool,
    pub hardware: Option<bool>,
}

/// Context captured when a frame is produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeStage {
    pub picture: Resolution,
    pub format: Option<PixelFormat>,
    pub color: ColorInfo,
    pub placeholder: bool,
}

pub trait PerformanceRecorder: Send + Sync {
    fn start(&self, key: i64, info: DecodeStart);
    fn record(&self, key: i64, stage: DecodeStage);
    fn record_until(&self, key: i64);
}

/// Recorder that discards everything
pub struct NoopRecorder;

impl PerformanceRecorder for NoopRecorder {
    fn start(&self, _key: i64, _info: DecodeStart) {}
    fn record(&self, _key: i64, _stage: DecodeStage) {}
    fn record_until(&self, _key: i64) {}
}

/// Recorder that emits `tracing` events with per-frame decode latency
#[derive(Default)]
pub struct TracingRecorder {
    open: Mutex<BTreeMap<i64, (Instant, DecodeStart)>>,
}

impl TracingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of measurements not yet closed
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

impl PerformanceRecorder for TracingRecorder {
    fn start(&self, key: i64, info: DecodeStart) {
        self.open.lock().insert(key, (Instant::now(), info));
    }

    fn record(&self, key: i64, stage: DecodeStage) {
        let Some((started, info)) = self.open.lock().remove(&key) else {
            return;
        };
        let elapsed: Duration = started.elapsed();
        trace!(
            target: "hwdec_pipeline::telemetry",
            key,
            stream = %info.stream_type,
            keyframe = info.keyframe,
            hardware = ?info.hardware,
            picture = %stage.picture,
            placeholder = stage.placeholder,
            latency_us = elapsed.as_micros() as u64,
            "frame decoded"
        );
    }

    fn record_until(&self, key: i64) {
        let mut open = self.open.lock();
        let keep = match key.checked_add(1) {
            Some(next) => open.split_off(&next),
            None => BTreeMap::new(),
        };
        let closed = std::mem::replace(&mut *open, keep);
        if !closed.is_empty() {
            trace!(
                target: "hwdec_pipeline::telemetry",
                closed = closed.len(),
                "measurements closed without a frame"
            );
        }
    }
}
