//! Asynchronous decode pipeline
//!
//! Architecture:
//! ```text
//! caller --decode/flush/drain/shutdown--> command queue --> Sequencer --submit--> engine
//!                                                              |                    |
//!                                                   settle-wait (blocking pool)     |
//!                                                                                   v
//! caller <--oneshot-- PendingResult <-- ReorderBuffer <-- CallbackBridge <-- engine thread
//!                     \_____________ one lock (SharedState) ____________/
//! ```
//!
//! Only one decode result may be outstanding at a time: the caller awaits
//! each `decode` before issuing the next one. Every resolution carries zero
//! or more frames in output order; `drain` returns whatever is left.

mod bridge;
mod reorder;
mod sequencer;
mod shared;
mod slot;
mod state;
mod stats;


pub use reorder::ReorderBuffer;
pub use state::LifecycleState;
pub use stats::PipelineStats;

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::engine::{DecodeEngine, DecodeEngineAdapter, FormatDescription};
use crate::error::{DecodeError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::telemetry::{PerformanceRecorder, TracingRecorder};
use crate::utils::{CallbackThreadRegistry, ThreadRegistry};
use crate::video::{DecodedFrame, DefaultImagePackager, ImageMetadata, ImagePackager, Sample};

use bridge::CallbackBridge;
use sequencer::{Command, Sequencer};
use shared::SharedState;
use state::Lifecycle;

/// Builder for [`DecodePipeline`] with optional collaborators
pub struct DecodePipelineBuilder {
    config: PipelineConfig,
    engine: Arc<dyn DecodeEngine>,
    packager: Option<Arc<dyn ImagePackager>>,
    recorder: Option<Arc<dyn PerformanceRecorder>>,
    registry: Option<Arc<dyn ThreadRegistry>>,
    events: Option<Arc<EventBus>>,
}

impl DecodePipelineBuilder {
    pub fn new(config: PipelineConfig, engine: Arc<dyn DecodeEngine>) -> Self {
        Self {
            config,
            engine,
            packager: None,
            recorder: None,
            registry: None,
            events: None,
        }
    }

    pub fn packager(mut self, packager: Arc<dyn ImagePackager>) -> Self {
        self.packager = Some(packager);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn PerformanceRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn thread_registry(mut self, registry: Arc<dyn ThreadRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> DecodePipeline {
        let software_images = self.config.output.software_images;
        DecodePipeline::new(
            self.config,
            self.engine,
            self.packager
                .unwrap_or_else(|| Arc::new(DefaultImagePackager::new(software_images))),
            self.recorder
                .unwrap_or_else(|| Arc::new(TracingRecorder::new())),
            self.registry
                .unwrap_or_else(|| Arc::new(CallbackThreadRegistry::new())),
            self.events.unwrap_or_else(|| Arc::new(EventBus::new())),
        )
    }
}

/// Hardware decode pipeline with ordered output
pub struct DecodePipeline {
    config: PipelineConfig,
    shared: Arc<SharedState>,
    adapter: Arc<Mutex<DecodeEngineAdapter>>,
    packager: Arc<dyn ImagePackager>,
    recorder: Arc<dyn PerformanceRecorder>,
    registry: Arc<dyn ThreadRegistry>,
    lifecycle: Arc<Lifecycle>,
    events: Arc<EventBus>,
    /// Command queue sender
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Command queue receiver (moved into worker on init)
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Reported by the session at init
    hardware: OnceLock<Option<bool>>,
    init_attempted: AtomicBool,
    shutdown_requested: AtomicBool,
}

impl DecodePipeline {
    pub fn builder(config: PipelineConfig, engine: Arc<dyn DecodeEngine>) -> DecodePipelineBuilder {
        DecodePipelineBuilder::new(config, engine)
    }

    pub fn new(
        config: PipelineConfig,
        engine: Arc<dyn DecodeEngine>,
        packager: Arc<dyn ImagePackager>,
        recorder: Arc<dyn PerformanceRecorder>,
        registry: Arc<dyn ThreadRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::new(
            config.reorder_window(),
            config.reorder.key,
            events.clone(),
        ));

        Self {
            shared,
            adapter: Arc::new(Mutex::new(DecodeEngineAdapter::new(engine))),
            packager,
            recorder,
            registry,
            lifecycle: Arc::new(Lifecycle::new(events.clone())),
            events,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            worker: Mutex::new(None),
            hardware: OnceLock::new(),
            init_attempted: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            config,
        }
    }

    /// Create the engine session and start the command sequencer
    ///
    /// A failure is fatal: the pipeline stays uninitialized for good.
    pub async fn init(&self) -> Result<()> {
        if self.shutdown_requested.load(Ordering::Acquire) {
            return Err(DecodeError::Closed);
        }
        if self.init_attempted.swap(true, Ordering::AcqRel) {
            return Err(DecodeError::InvalidState(format!(
                "init already attempted (state: {})",
                self.state()
            )));
        }

        if let Err(e) = self.create_session().await {
            error!("Failed to initialize decode pipeline: {}", e);
            return Err(e);
        }

        // `shutdown` checks for a worker under the same lock, so it either
        // sees the worker or is seen here
        let mut worker = self.worker.lock();
        if self.shutdown_requested.load(Ordering::Acquire) {
            drop(worker);
            info!("Shutdown requested during initialization, releasing session");
            self.adapter.lock().shutdown();
            return Err(DecodeError::Closed);
        }

        let hardware = self.adapter.lock().is_hardware_accelerated();
        let _ = self.hardware.set(hardware);
        self.lifecycle.set(LifecycleState::Ready);
        *worker = self.spawn_worker(hardware);
        drop(worker);

        info!(
            "Decode pipeline ready: {} {} (reorder window {}, {:?} order)",
            self.config.stream.stream_type,
            self.config.stream.picture,
            self.shared.window(),
            self.config.reorder.key
        );
        Ok(())
    }

    async fn create_session(&self) -> Result<()> {
        self.config.validate()?;
        let format = FormatDescription::from_config(&self.config)?;
        let metadata = ImageMetadata {
            display: self.config.display(),
            picture: self.config.stream.picture,
            color: self.config.color_info(),
        };
        let bridge = Arc::new(CallbackBridge::new(
            self.shared.clone(),
            self.packager.clone(),
            self.recorder.clone(),
            self.registry.clone(),
            metadata,
        ));

        let adapter = self.adapter.clone();
        tokio::task::spawn_blocking(move || {
            let mut adapter = adapter.lock();
            adapter.initialize(format, bridge)
        })
        .await
        .map_err(|e| DecodeError::Fatal(format!("session creation task failed: {}", e)))?
    }

    fn spawn_worker(&self, hardware: Option<bool>) -> Option<JoinHandle<()>> {
        let rx = self.cmd_rx.lock().take()?;
        let sequencer = Sequencer {
            shared: self.shared.clone(),
            adapter: self.adapter.clone(),
            recorder: self.recorder.clone(),
            lifecycle: self.lifecycle.clone(),
            stream_type: self.config.stream.stream_type,
            hardware,
        };
        Some(tokio::spawn(sequencer.run(rx)))
    }

    fn check_accepting(&self) -> Result<()> {
        if self.shutdown_requested.load(Ordering::Acquire) {
            return Err(DecodeError::Closed);
        }
        match self.lifecycle.get() {
            LifecycleState::Uninitialized => Err(DecodeError::NotInitialized),
            state if state.is_closed() => Err(DecodeError::Closed),
            _ => Ok(()),
        }
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        self.cmd_tx.send(command).map_err(|_| DecodeError::Closed)
    }

    /// Submit one sample
    ///
    /// The request is queued immediately; the returned future only waits for
    /// the result. Resolves with the frames the reorder window releases,
    /// possibly none.
    pub fn decode(
        &self,
        sample: Sample,
    ) -> impl Future<Output = Result<Vec<DecodedFrame>>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = self
            .check_accepting()
            .and_then(|_| self.enqueue(Command::Decode { sample, reply }));

        async move {
            queued?;
            rx.await.unwrap_or(Err(DecodeError::Closed))
        }
    }

    /// Discard everything in flight
    ///
    /// The pipeline reports `Flushing` from this call until the flush has
    /// been processed. A pending decode fails with [`DecodeError::Cancelled`].
    pub fn flush(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = match self.check_accepting() {
            Ok(()) => {
                self.shared.set_flushing(true);
                self.events.publish(PipelineEvent::StateChanged {
                    state: LifecycleState::Flushing,
                });
                Ok(self.enqueue(Command::Flush { reply }).is_ok())
            }
            Err(DecodeError::Closed) => Ok(false),
            Err(e) => Err(e),
        };

        async move {
            if queued? {
                rx.await.unwrap_or(Ok(()))
            } else {
                Ok(())
            }
        }
    }

    /// Wait for all in-flight work and return every buffered frame in order
    pub fn drain(&self) -> impl Future<Output = Result<Vec<DecodedFrame>>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = self
            .check_accepting()
            .and_then(|_| self.enqueue(Command::Drain { reply }));

        async move {
            queued?;
            rx.await.unwrap_or(Err(DecodeError::Closed))
        }
    }

    /// Wait for in-flight work, invalidate the session and release it
    ///
    /// Idempotent; later calls resolve once the first shutdown is done.
    pub fn shutdown(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let first = !self.shutdown_requested.swap(true, Ordering::AcqRel);

        let queued = if self.worker.lock().is_none() {
            if first {
                self.shared.close();
                self.lifecycle.set(LifecycleState::ShutDown);
                info!("Decode pipeline shut down before initialization");
            }
            false
        } else {
            self.enqueue(Command::Shutdown { reply }).is_ok()
        };

        async move {
            if queued {
                rx.await.unwrap_or(Ok(()))
            } else {
                Ok(())
            }
        }
    }

    /// Turn frames ending before `threshold` into placeholders; `None` clears
    pub fn set_seek_threshold(&self, threshold: Option<i64>) {
        self.shared.set_seek_threshold(threshold);
    }

    pub fn state(&self) -> LifecycleState {
        match self.lifecycle.get() {
            LifecycleState::Ready if self.shared.is_flushing() => LifecycleState::Flushing,
            state => state,
        }
    }

    pub fn reorder_window(&self) -> usize {
        self.shared.window()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_hardware_accelerated(&self) -> Option<bool> {
        self.hardware.get().copied().flatten()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }
}
