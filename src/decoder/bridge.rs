use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, trace, warn};

use super::shared::SharedState;
use super::stats::StatsCounters;
use crate::engine::{Completion, CompletionHandler, DecodeInfoFlags, EngineStatus};
use crate::error::DecodeError;
use crate::telemetry::{DecodeStage, PerformanceRecorder};
use crate::utils::{LogThrottler, ThreadRegistry};
use crate::video::{DecodedFrame, ImageMetadata, ImagePackager};

/// What a throttled failure log line is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FailureKey {
    Status(EngineStatus),
    Packaging,
}

/// Engine-facing completion entry point
///
/// Runs on whatever thread the engine delivers on. Every path takes the
/// shared lock for a short critical section only; packaging happens
/// outside of it.
pub(crate) struct CallbackBridge {
    shared: Arc<SharedState>,
    packager: Arc<dyn ImagePackager>,
    recorder: Arc<dyn PerformanceRecorder>,
    registry: Arc<dyn ThreadRegistry>,
    metadata: ImageMetadata,
    last_thread: Mutex<Option<ThreadId>>,
    throttler: LogThrottler<FailureKey>,
}

impl CallbackBridge {
    pub fn new(
        shared: Arc<SharedState>,
        packager: Arc<dyn ImagePackager>,
        recorder: Arc<dyn PerformanceRecorder>,
        registry: Arc<dyn ThreadRegistry>,
        metadata: ImageMetadata,
    ) -> Self {
        Self {
            shared,
            packager,
            recorder,
            registry,
            metadata,
            last_thread: Mutex::new(None),
            throttler: LogThrottler::with_secs(5),
        }
    }

    fn register_thread(&self) {
        let current = std::thread::current();
        let mut last = self.last_thread.lock();
        if *last == Some(current.id()) {
            return;
        }
        self.registry.register(&current);
        *last = Some(current.id());
    }

    /// Fail the pending request for the unit at `decode_ts_us`
    fn on_error(&self, decode_ts_us: i64, error: DecodeError) {
        let key = match error.status() {
            Some(status) => FailureKey::Status(status),
            None => FailureKey::Packaging,
        };
        if self.throttler.should_log(&key) {
            warn!("Decode of dts={}us failed: {}", decode_ts_us, error);
        }
        self.recorder.record_until(decode_ts_us);
        self.shared.fail_pending(error);
    }
}

impl CompletionHandler for CallbackBridge {
    fn on_completion(&self, completion: Completion) {
        self.register_thread();

        if self.shared.is_closed() {
            warn!(
                "Ignoring completion for dts={}us delivered after shutdown",
                completion.descriptor.decode_ts_us
            );
            return;
        }

        let descriptor = completion.descriptor;

        if !completion.status.is_ok() {
            self.on_error(
                descriptor.decode_ts_us,
                DecodeError::engine(completion.status, "completion"),
            );
            return;
        }

        if self.shared.is_flushing() {
            trace!("Discarding dts={}us during flush", descriptor.decode_ts_us);
            return;
        }

        let image = match completion.image {
            Some(image) if !completion.flags.contains(DecodeInfoFlags::FRAME_DROPPED) => image,
            _ => {
                debug!("Engine dropped dts={}us", descriptor.decode_ts_us);
                StatsCounters::inc(&self.shared.stats.frames_dropped);
                self.recorder.record_until(descriptor.decode_ts_us);
                self.shared.resolve_ready();
                return;
            }
        };

        let suppressed = {
            let mut state = self.shared.lock();
            if self.shared.is_flushing() {
                return;
            }
            state.suppress(&descriptor)
        };

        let (frame, format) = if suppressed {
            StatsCounters::inc(&self.shared.stats.placeholders);
            (DecodedFrame::Placeholder { descriptor }, None)
        } else {
            match self.packager.package(image, &descriptor, &self.metadata) {
                Ok(image) => {
                    StatsCounters::inc(&self.shared.stats.frames_decoded);
                    let format = image.format;
                    (DecodedFrame::Video { image, descriptor }, Some(format))
                }
                Err(e) => {
                    self.on_error(descriptor.decode_ts_us, e);
                    return;
                }
            }
        };

        self.recorder.record(
            descriptor.decode_ts_us,
            DecodeStage {
                picture: self.metadata.picture,
                format,
                color: self.metadata.color,
                placeholder: suppressed,
            },
        );

        trace!("Completed {}", frame);
        if !self.shared.push_and_resolve(frame) {
            trace!("Discarding dts={}us during flush", descriptor.decode_ts_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ReorderKey};
    use crate::engine::simulated::synthetic_image;
    use crate::engine::EngineStatus;
    use crate::events::EventBus;
    use crate::telemetry::NoopRecorder;
    use crate::utils::CallbackThreadRegistry;
    use crate::video::{DefaultImagePackager, FrameDescriptor, PixelFormat, Resolution};
    use tokio::sync::oneshot;

    struct Fixture {
        shared: Arc<SharedState>,
        bridge: Arc<CallbackBridge>,
        registry: Arc<CallbackThreadRegistry>,
    }

    fn fixture(window: usize) -> Fixture {
        let config = PipelineConfig::default();
        let shared = Arc::new(SharedState::new(
            window,
            ReorderKey::Decode,
            Arc::new(EventBus::new()),
        ));
        let registry = Arc::new(CallbackThreadRegistry::new());
        let bridge = Arc::new(CallbackBridge::new(
            shared.clone(),
            Arc::new(DefaultImagePackager::new(false)),
            Arc::new(NoopRecorder),
            registry.clone(),
            ImageMetadata {
                display: Resolution::new(16, 16),
                picture: Resolution::new(16, 16),
                color: config.color_info(),
            },
        ));
        Fixture {
            shared,
            bridge,
            registry,
        }
    }

    fn descriptor(ts: i64) -> FrameDescriptor {
        FrameDescriptor {
            byte_offset: ts * 100,
            decode_ts_us: ts,
            composition_ts_us: ts,
            duration_us: 1,
            is_sync_point: ts == 0,
        }
    }

    fn completion(ts: i64) -> Completion {
        Completion {
            status: EngineStatus::OK,
            flags: DecodeInfoFlags::ASYNCHRONOUS,
            image: Some(synthetic_image(
                Resolution::new(16, 16),
                PixelFormat::Nv12,
                &descriptor(ts),
            )),
            descriptor: descriptor(ts),
        }
    }

    fn expect_pending(shared: &SharedState) -> oneshot::Receiver<crate::error::Result<Vec<DecodedFrame>>> {
        let (tx, rx) = oneshot::channel();
        assert!(shared.install(tx).is_ok());
        rx
    }

    fn deliver(bridge: &Arc<CallbackBridge>, completion: Completion) {
        let bridge = bridge.clone();
        std::thread::spawn(move || bridge.on_completion(completion))
            .join()
            .unwrap();
    }

    fn timestamps(frames: &[DecodedFrame]) -> Vec<i64> {
        frames.iter().map(|f| f.decode_ts_us()).collect()
    }

    #[test]
    fn test_out_of_order_completions_emit_in_order() {
        let f = fixture(1);
        let mut emitted = Vec::new();

        for ts in [1, 0, 2] {
            let mut rx = expect_pending(&f.shared);
            deliver(&f.bridge, completion(ts));
            emitted.extend(timestamps(&rx.try_recv().unwrap().unwrap()));
        }
        emitted.extend(timestamps(&f.shared.drain()));

        assert_eq!(emitted, vec![0, 1, 2]);
        assert_eq!(f.registry.len(), 3);
    }

    /// Every ordering of `0..n` where no unit completes more than `window`
    /// positions after its decode position
    fn bounded_orders(n: i64, window: usize) -> Vec<Vec<i64>> {
        fn extend(order: &mut Vec<i64>, n: i64, window: usize, out: &mut Vec<Vec<i64>>) {
            if order.len() == n as usize {
                out.push(order.clone());
                return;
            }
            let position = order.len();
            for ts in 0..n {
                if order.contains(&ts) {
                    continue;
                }
                // The oldest missing unit must not fall further behind
                let oldest_missing = (0..n).find(|t| !order.contains(t) && *t != ts);
                if let Some(oldest) = oldest_missing {
                    if position + 1 > oldest as usize + window {
                        continue;
                    }
                }
                order.push(ts);
                extend(order, n, window, out);
                order.pop();
            }
        }

        let mut out = Vec::new();
        extend(&mut Vec::new(), n, window, &mut out);
        out
    }

    #[test]
    fn test_any_bounded_interleaving_emits_in_order() {
        for window in [2usize, 3] {
            let orders = bounded_orders(6, window);
            assert!(orders.len() > 20);

            for order in orders {
                let f = fixture(window);
                let mut emitted = Vec::new();

                for (step, &ts) in order.iter().enumerate() {
                    let mut rx = expect_pending(&f.shared);
                    f.bridge.on_completion(completion(ts));
                    for frame in rx.try_recv().unwrap().unwrap() {
                        let out = frame.decode_ts_us();
                        let later = order[..=step].iter().filter(|&&t| t > out).count();
                        assert!(
                            later >= window,
                            "dts {} emitted after {} later completions ({:?}, window {})",
                            out,
                            later,
                            order,
                            window
                        );
                        emitted.push(out);
                    }
                }
                emitted.extend(timestamps(&f.shared.drain()));

                assert_eq!(
                    emitted,
                    (0..6).collect::<Vec<_>>(),
                    "completion order {:?}, window {}",
                    order,
                    window
                );
            }
        }
    }

    #[test]
    fn test_error_status_rejects_pending() {
        let f = fixture(0);
        let mut rx = expect_pending(&f.shared);

        let mut failed = completion(0);
        failed.status = EngineStatus::BAD_DATA;
        failed.image = None;
        deliver(&f.bridge, failed);

        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.status(), Some(EngineStatus::BAD_DATA));
        assert_eq!(f.shared.stats().decode_errors, 1);

        // Still usable
        let mut rx = expect_pending(&f.shared);
        deliver(&f.bridge, completion(1));
        assert_eq!(timestamps(&rx.try_recv().unwrap().unwrap()), vec![1]);
    }

    #[test]
    fn test_dropped_completion_resolves_buffered_output() {
        let f = fixture(0);
        let mut rx = expect_pending(&f.shared);

        let mut dropped = completion(0);
        dropped.flags = DecodeInfoFlags::ASYNCHRONOUS | DecodeInfoFlags::FRAME_DROPPED;
        deliver(&f.bridge, dropped);

        assert!(rx.try_recv().unwrap().unwrap().is_empty());
        assert_eq!(f.shared.stats().frames_dropped, 1);
    }

    #[test]
    fn test_seek_threshold_produces_placeholders() {
        let f = fixture(0);
        f.shared.set_seek_threshold(Some(2));

        let mut frames = Vec::new();
        for ts in 0..3 {
            let mut rx = expect_pending(&f.shared);
            deliver(&f.bridge, completion(ts));
            frames.extend(rx.try_recv().unwrap().unwrap());
        }

        // ts 0 ends at 1 (< 2), ts 1 ends at 2 (reaches the target)
        assert!(frames[0].is_placeholder());
        assert!(!frames[1].is_placeholder());
        assert!(!frames[2].is_placeholder());
        assert_eq!(f.shared.stats().placeholders, 1);
    }

    #[test]
    fn test_completion_during_flush_is_discarded() {
        let f = fixture(0);
        f.shared.set_flushing(true);
        deliver(&f.bridge, completion(0));
        assert_eq!(f.shared.stats().buffered, 0);
    }

    #[test]
    fn test_completion_after_shutdown_is_ignored() {
        let f = fixture(0);
        let mut rx = expect_pending(&f.shared);
        f.shared.close();
        deliver(&f.bridge, completion(0));
        assert!(rx.try_recv().is_err());
        assert_eq!(f.shared.stats().buffered, 0);
    }

    #[test]
    fn test_packaging_failure_rejects_pending() {
        let f = fixture(0);
        let mut rx = expect_pending(&f.shared);

        let mut broken = completion(0);
        if let Some(image) = broken.image.as_mut() {
            image.planes.pop();
        }
        deliver(&f.bridge, broken);

        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(DecodeError::ImagePackaging(_))
        ));
    }
}
