use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::shared::SharedState;
use super::slot::ResultSender;
use super::state::{Lifecycle, LifecycleState};
use super::stats::StatsCounters;
use crate::engine::{DecodeEngineAdapter, SubmitOutcome};
use crate::error::{DecodeError, Result};
use crate::events::PipelineEvent;
use crate::telemetry::{DecodeStart, PerformanceRecorder};
use crate::video::{DecodedFrame, Sample, StreamType};

/// Requests serialised through the command queue
pub(crate) enum Command {
    Decode { sample: Sample, reply: ResultSender },
    Flush { reply: oneshot::Sender<Result<()>> },
    Drain { reply: ResultSender },
    Shutdown { reply: oneshot::Sender<Result<()>> },
}

/// Single-threaded executor of pipeline commands
///
/// Commands run one at a time in arrival order. The only blocking step, the
/// engine settle-wait, runs on the blocking pool.
pub(crate) struct Sequencer {
    pub shared: Arc<SharedState>,
    pub adapter: Arc<Mutex<DecodeEngineAdapter>>,
    pub recorder: Arc<dyn PerformanceRecorder>,
    pub lifecycle: Arc<Lifecycle>,
    pub stream_type: StreamType,
    pub hardware: Option<bool>,
}

impl Sequencer {
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Decode { sample, reply } => self.decode(sample, reply),
                Command::Flush { reply } => {
                    let _ = reply.send(self.flush().await);
                }
                Command::Drain { reply } => {
                    let _ = reply.send(self.drain().await);
                }
                Command::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(Ok(()));
                    debug!("Command sequencer exiting after shutdown");
                    return;
                }
            }
        }

        // Every handle is gone without an explicit shutdown
        warn!("Decode pipeline dropped without shutdown, releasing engine session");
        self.shutdown().await;
    }

    fn decode(&self, sample: Sample, reply: ResultSender) {
        if let Err(reply) = self.shared.install(reply) {
            warn!(
                "Rejecting decode of dts={}us: previous result not consumed",
                sample.decode_ts_us
            );
            let _ = reply.send(Err(DecodeError::InvalidState(
                "a decode request is already outstanding".to_string(),
            )));
            return;
        }

        if self.shared.is_flushing() {
            debug!("Cancelling decode of dts={}us: flushing", sample.decode_ts_us);
            self.shared.reject_pending(DecodeError::Cancelled);
            return;
        }

        self.recorder.start(
            sample.decode_ts_us,
            DecodeStart {
                stream_type: self.stream_type,
                keyframe: sample.keyframe,
                hardware: self.hardware,
            },
        );
        StatsCounters::inc(&self.shared.stats.samples_submitted);

        let key = sample.decode_ts_us;
        let outcome = self.adapter.lock().submit(&sample);
        match outcome {
            Ok(SubmitOutcome::Queued) => {}
            Ok(SubmitOutcome::Dropped) => {
                debug!("Engine dropped dts={}us on submit", key);
                StatsCounters::inc(&self.shared.stats.frames_dropped);
                self.recorder.record_until(key);
                self.shared.resolve_ready();
            }
            Ok(SubmitOutcome::Failed(status)) => {
                warn!("Engine rejected dts={}us: {}", key, status);
                self.recorder.record_until(key);
                self.shared.fail_pending(DecodeError::engine(status, "submit"));
            }
            Err(e) => {
                warn!("Failed to submit dts={}us: {}", key, e);
                self.recorder.record_until(key);
                self.shared.fail_pending(e);
            }
        }
    }

    /// Wait for every queued unit. Failures are logged and ignored.
    async fn settle(&self, operation: &'static str) {
        let adapter = self.adapter.clone();
        let waited = tokio::task::spawn_blocking(move || {
            let adapter = adapter.lock();
            adapter.wait_for_outstanding()
        })
        .await;
        match waited {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Settle-wait before {} failed: {}", operation, e),
            Err(e) => warn!("Settle-wait task before {} failed: {}", operation, e),
        }
    }

    async fn flush(&self) -> Result<()> {
        self.settle("flush").await;

        let cancelled = self.shared.reject_pending(DecodeError::Cancelled);
        let discarded = self.shared.discard();
        self.recorder.record_until(i64::MAX);
        self.shared.set_flushing(false);

        info!(
            "Flushed decode pipeline ({} frames discarded, pending cancelled: {})",
            discarded, cancelled
        );
        self.shared.events.publish(PipelineEvent::Flushed { discarded });
        self.shared.events.publish(PipelineEvent::StateChanged {
            state: LifecycleState::Ready,
        });
        Ok(())
    }

    async fn drain(&self) -> Result<Vec<DecodedFrame>> {
        self.settle("drain").await;

        let frames = self.shared.drain();
        debug!("Drained {} frames", frames.len());
        self.shared.events.publish(PipelineEvent::Drained {
            frames: frames.len(),
        });
        Ok(frames)
    }

    async fn shutdown(&self) {
        self.lifecycle.set(LifecycleState::ShuttingDown);

        let adapter = self.adapter.clone();
        let released = tokio::task::spawn_blocking(move || {
            let mut adapter = adapter.lock();
            adapter.shutdown();
        })
        .await;
        if let Err(e) = released {
            warn!("Engine shutdown task failed: {}", e);
        }

        self.shared.close();
        self.shared.reject_pending(DecodeError::Cancelled);
        let discarded = self.shared.discard();
        self.recorder.record_until(i64::MAX);
        self.shared.set_flushing(false);

        self.lifecycle.set(LifecycleState::ShutDown);
        info!(
            "Decode pipeline shut down ({} buffered frames released)",
            discarded
        );
    }
}
