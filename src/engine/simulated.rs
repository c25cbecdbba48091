//! Software stand-in for a hardware decode engine
//!
//! Units are delivered from a dedicated delivery thread, after a fixed
//! latency, with synthetic images of the requested output format. Drops and
//! failures can be injected at fixed intervals.
//!
//! With a non-zero `lookahead` the engine holds back up to that many units;
//! the next unit completes the whole batch newest first, so completions
//! arrive out of decode order. A batch that stops growing is released after
//! `lookahead_timeout`. A reorder window of at least `lookahead` restores
//! decode order.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

use super::{
    Completion, CompletionHandler, DecodeEngine, DecodeInfoFlags, EngineImage, EngineSession,
    EngineStatus, FormatDescription, SubmitOutcome, TransportBuffer,
};
use crate::video::{FrameDescriptor, ImagePlane, PixelFormat, Resolution};

/// Simulated engine behaviour
#[derive(Debug, Clone)]
pub struct SimulatedEngineConfig {
    /// Delay before each unit is delivered
    pub latency: Duration,
    /// Every Nth submission is dropped synchronously
    pub drop_interval: Option<u64>,
    /// Every Nth queued unit completes with the dropped flag and no image
    pub async_drop_interval: Option<u64>,
    /// Every Nth queued unit completes with an error status
    pub fail_interval: Option<u64>,
    /// Reported hardware acceleration
    pub hardware: bool,
    /// Units held back before a batch is completed in reverse order
    pub lookahead: usize,
    /// How long a partial batch waits for more units
    pub lookahead_timeout: Duration,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(2),
            drop_interval: None,
            async_drop_interval: None,
            fail_interval: None,
            hardware: true,
            lookahead: 0,
            lookahead_timeout: Duration::from_millis(5),
        }
    }
}

fn hits(interval: Option<u64>, n: u64) -> bool {
    matches!(interval, Some(k) if k > 0 && n % k == 0)
}

/// Simulated decode engine
pub struct SimulatedEngine {
    config: SimulatedEngineConfig,
}

impl SimulatedEngine {
    pub fn new(config: SimulatedEngineConfig) -> Self {
        Self { config }
    }
}

impl DecodeEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create_session(
        &self,
        format: &FormatDescription,
        handler: Arc<dyn CompletionHandler>,
    ) -> Result<Box<dyn EngineSession>, EngineStatus> {
        let (tx, rx) = mpsc::channel::<Unit>();
        let in_flight = Arc::new(InFlight::default());
        let invalidated = Arc::new(AtomicBool::new(false));

        let delivery = Delivery {
            rx,
            handler,
            in_flight: in_flight.clone(),
            invalidated: invalidated.clone(),
            latency: self.config.latency,
            lookahead: self.config.lookahead,
            lookahead_timeout: self.config.lookahead_timeout,
            picture: format.picture,
            output_format: format.output_format,
        };

        let worker = std::thread::Builder::new()
            .name("sim-decode".to_string())
            .spawn(move || delivery.run())
            .map_err(|_| EngineStatus::ALLOCATION_FAILED)?;

        Ok(Box::new(SimulatedSession {
            tx: Some(tx),
            worker: Some(worker),
            in_flight,
            invalidated,
            config: self.config.clone(),
            submitted: 0,
            queued: 0,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Decode,
    Drop,
    Fail,
}

struct Unit {
    descriptor: FrameDescriptor,
    fate: Fate,
}

/// Counter of queued but undelivered units
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    settled: Condvar,
}

impl InFlight {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.settled.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.settled.wait(&mut count);
        }
    }
}

struct SimulatedSession {
    tx: Option<mpsc::Sender<Unit>>,
    worker: Option<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
    invalidated: Arc<AtomicBool>,
    config: SimulatedEngineConfig,
    submitted: u64,
    queued: u64,
}

impl EngineSession for SimulatedSession {
    fn submit(&mut self, buffer: TransportBuffer, descriptor: FrameDescriptor) -> SubmitOutcome {
        let tx = match self.tx.as_ref() {
            Some(tx) => tx,
            None => return SubmitOutcome::Failed(EngineStatus::INVALIDATED),
        };

        self.submitted += 1;
        if hits(self.config.drop_interval, self.submitted) {
            debug!("Simulated engine dropped dts={}us", buffer.decode_ts_us);
            return SubmitOutcome::Dropped;
        }

        self.queued += 1;
        let fate = if hits(self.config.fail_interval, self.queued) {
            Fate::Fail
        } else if hits(self.config.async_drop_interval, self.queued) {
            Fate::Drop
        } else {
            Fate::Decode
        };

        self.in_flight.add();
        if tx.send(Unit { descriptor, fate }).is_err() {
            self.in_flight.done();
            return SubmitOutcome::Failed(EngineStatus::INVALIDATED);
        }
        SubmitOutcome::Queued
    }

    fn wait_for_outstanding(&self) -> Result<(), EngineStatus> {
        self.in_flight.wait();
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), EngineStatus> {
        self.invalidated.store(true, Ordering::SeqCst);
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| EngineStatus::BAD_DATA)?;
        }
        Ok(())
    }

    fn is_hardware_accelerated(&self) -> Option<bool> {
        Some(self.config.hardware)
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        let _ = self.invalidate();
    }
}

struct Delivery {
    rx: mpsc::Receiver<Unit>,
    handler: Arc<dyn CompletionHandler>,
    in_flight: Arc<InFlight>,
    invalidated: Arc<AtomicBool>,
    latency: Duration,
    lookahead: usize,
    lookahead_timeout: Duration,
    picture: Resolution,
    output_format: PixelFormat,
}

impl Delivery {
    fn run(self) {
        let mut held: Vec<Unit> = Vec::with_capacity(self.lookahead + 1);
        loop {
            let next = if held.is_empty() {
                self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
            } else {
                self.rx.recv_timeout(self.lookahead_timeout)
            };

            match next {
                Ok(unit) => {
                    held.push(unit);
                    if held.len() > self.lookahead {
                        self.release(&mut held);
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.release(&mut held),
                Err(RecvTimeoutError::Disconnected) => {
                    self.release(&mut held);
                    break;
                }
            }
        }
        debug!("Simulated engine delivery thread exiting");
    }

    /// Complete every held unit, newest first
    fn release(&self, held: &mut Vec<Unit>) {
        if held.len() > 1 {
            trace!("Simulated engine releasing {} units out of order", held.len());
        }
        while let Some(unit) = held.pop() {
            self.deliver(unit);
        }
    }

    fn deliver(&self, unit: Unit) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if self.invalidated.load(Ordering::SeqCst) {
            self.in_flight.done();
            return;
        }

        let completion = match unit.fate {
            Fate::Fail => Completion {
                status: EngineStatus::BAD_DATA,
                flags: DecodeInfoFlags::ASYNCHRONOUS,
                image: None,
                descriptor: unit.descriptor,
            },
            Fate::Drop => Completion {
                status: EngineStatus::OK,
                flags: DecodeInfoFlags::ASYNCHRONOUS | DecodeInfoFlags::FRAME_DROPPED,
                image: None,
                descriptor: unit.descriptor,
            },
            Fate::Decode => Completion {
                status: EngineStatus::OK,
                flags: DecodeInfoFlags::ASYNCHRONOUS,
                image: Some(synthetic_image(
                    self.picture,
                    self.output_format,
                    &unit.descriptor,
                )),
                descriptor: unit.descriptor,
            },
        };

        trace!(
            "Simulated engine delivering dts={}us ({:?})",
            unit.descriptor.decode_ts_us,
            unit.fate
        );
        self.handler.on_completion(completion);
        self.in_flight.done();
    }
}

/// Flat-colored image whose luma encodes the presentation time
pub(crate) fn synthetic_image(
    size: Resolution,
    format: PixelFormat,
    descriptor: &FrameDescriptor,
) -> EngineImage {
    let luma = ((descriptor.composition_ts_us / 1000).rem_euclid(220) + 16) as u8;
    let w = size.width as usize;
    let h = size.height as usize;
    let cw = (w + 1) / 2;
    let ch = (h + 1) / 2;

    let plane = |value: u8, stride: usize, width: usize, height: usize| ImagePlane {
        data: Bytes::from(vec![value; stride * height]),
        stride,
        width: width as u32,
        height: height as u32,
    };

    let planes = match format {
        PixelFormat::Yuv420p => vec![
            plane(luma, w, w, h),
            plane(128, cw, cw, ch),
            plane(128, cw, cw, ch),
        ],
        PixelFormat::Nv12 | PixelFormat::Nv12Full => {
            vec![plane(luma, w, w, h), plane(128, cw * 2, cw, ch)]
        }
        PixelFormat::P010 | PixelFormat::P010Full => {
            vec![plane(luma, w * 2, w, h), plane(128, cw * 4, cw, ch)]
        }
        PixelFormat::Yuv422 => vec![plane(luma, w * 2, w, h)],
        PixelFormat::Bgra32 => vec![plane(luma, w * 4, w, h)],
    };

    EngineImage {
        size,
        format,
        planes,
    }
}
