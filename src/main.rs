use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hwdec_pipeline::config::{ConfigStore, PipelineConfig, ReorderKey};
use hwdec_pipeline::video::{Sample, StreamType};
use hwdec_pipeline::{
    DecodePipeline, DecodedFrame, ErrorKind, PipelineEvent, SimulatedEngine, SimulatedEngineConfig,
};

/// Log level for the simulator
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Drive the decode pipeline with a synthetic stream and a simulated engine
#[derive(Parser, Debug)]
#[command(name = "hwdec-sim")]
#[command(version, about = "Hardware decode pipeline simulator", long_about = None)]
struct CliArgs {
    /// Pipeline configuration file (JSON, created with defaults if missing)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long, requires = "config")]
    save: bool,

    /// Stream type (h264, hevc, vp9, av1)
    #[arg(short = 's', long, value_name = "TYPE")]
    stream: Option<StreamType>,

    /// Number of samples to submit
    #[arg(short = 'n', long, default_value_t = 48)]
    frames: u32,

    /// Keyframe interval
    #[arg(long, default_value_t = 12)]
    gop: u32,

    /// B-frames between anchors (decode order differs from presentation order)
    #[arg(short = 'b', long, default_value_t = 2)]
    b_frames: u32,

    /// Frame duration in microseconds
    #[arg(long, default_value_t = 33_333)]
    frame_duration_us: i64,

    /// Simulated engine latency per unit
    #[arg(long, default_value_t = 2)]
    latency_ms: u64,

    /// Units the simulated engine holds back and completes out of order
    #[arg(long, default_value_t = 0)]
    lookahead: u32,

    /// Output order key (decode, presentation)
    #[arg(long, value_name = "KEY")]
    order: Option<ReorderKey>,

    /// Release frames as soon as they complete
    #[arg(long)]
    low_latency: bool,

    /// Return software (I420) images instead of engine-owned planes
    #[arg(long)]
    software: bool,

    /// Emit placeholders for frames ending before this timestamp (us)
    #[arg(long, value_name = "US")]
    seek_to: Option<i64>,

    /// Drop every Nth submission synchronously
    #[arg(long, value_name = "N")]
    drop_every: Option<u64>,

    /// Fail every Nth queued unit
    #[arg(long, value_name = "N")]
    fail_every: Option<u64>,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting hwdec-sim v{}", env!("CARGO_PKG_VERSION"));

    let store = match &args.config {
        Some(path) => Some(ConfigStore::open(path).await?),
        None => None,
    };
    let mut config = store
        .as_ref()
        .map(|store| (*store.get()).clone())
        .unwrap_or_default();
    apply_overrides(&mut config, &args);
    config.validate()?;

    if let (Some(store), true) = (&store, args.save) {
        store.set(config.clone()).await?;
        tracing::info!("Saved configuration to {}", store.path().display());
    }

    let engine = SimulatedEngine::new(SimulatedEngineConfig {
        latency: Duration::from_millis(args.latency_ms),
        drop_interval: args.drop_every,
        fail_interval: args.fail_every,
        lookahead: args.lookahead as usize,
        ..Default::default()
    });

    let pipeline = DecodePipeline::builder(config, Arc::new(engine)).build();
    if pipeline.reorder_window() < args.lookahead as usize {
        tracing::warn!(
            "Reorder window {} is smaller than the engine lookahead {}, output may be out of order",
            pipeline.reorder_window(),
            args.lookahead
        );
    }
    let mut events = pipeline.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                PipelineEvent::DecodeError { .. } => {
                    tracing::warn!("{}: {:?}", event.event_name(), event)
                }
                _ => tracing::debug!("{}: {:?}", event.event_name(), event),
            }
        }
    });

    pipeline.init().await?;
    pipeline.set_seek_threshold(args.seek_to);

    let samples = build_samples(&args);
    tracing::info!(
        "Submitting {} samples (gop {}, {} b-frames, reorder window {})",
        samples.len(),
        args.gop,
        args.b_frames,
        pipeline.reorder_window()
    );

    let started = Instant::now();
    let mut emitted: Vec<DecodedFrame> = Vec::with_capacity(samples.len());
    for sample in samples {
        match pipeline.decode(sample).await {
            Ok(frames) => emitted.extend(frames),
            Err(e) if e.is_cancelled() => {}
            Err(e) if e.kind() == ErrorKind::Transient => {
                tracing::debug!("Sample failed, continuing: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    emitted.extend(pipeline.drain().await?);
    let elapsed = started.elapsed();

    let stats = pipeline.stats();
    let key = pipeline.config().reorder.key;
    pipeline.shutdown().await?;
    event_logger.abort();

    report(&emitted, elapsed, key);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "submitted {} | decoded {} | placeholders {} | dropped {} | errors {} | cancelled {}",
            stats.samples_submitted,
            stats.frames_decoded,
            stats.placeholders,
            stats.frames_dropped,
            stats.decode_errors,
            stats.requests_cancelled
        );
    }

    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &CliArgs) {
    if let Some(stream) = args.stream {
        config.stream.stream_type = stream;
        config.stream.mime_type = None;
    }
    if let Some(order) = args.order {
        config.reorder.key = order;
    }
    if args.low_latency {
        config.reorder.low_latency = true;
    }
    if args.software {
        config.output.software_images = true;
    }
    // The reorder window must cover every unit the engine may hold back
    config.stream.max_ref_frames = config.stream.max_ref_frames.max(args.lookahead);
}

/// Synthetic stream in decode order
///
/// Each anchor is sent ahead of the B-frames that display before it, so
/// decode and presentation order differ whenever `b_frames > 0`.
fn build_samples(args: &CliArgs) -> Vec<Sample> {
    let frames = args.frames;
    let gop = args.gop.max(1);
    let duration = args.frame_duration_us;

    let mut display_order = Vec::with_capacity(frames as usize);
    let mut next = 0;
    while next < frames {
        if next % gop == 0 {
            display_order.push(next);
            next += 1;
            continue;
        }
        let gop_end = (next / gop + 1) * gop;
        let anchor = (next + args.b_frames).min(gop_end - 1).min(frames - 1);
        display_order.push(anchor);
        display_order.extend(next..anchor);
        next = anchor + 1;
    }

    let mut offset = 0i64;
    display_order
        .into_iter()
        .enumerate()
        .map(|(decode_index, display_index)| {
            let keyframe = display_index % gop == 0;
            let size = if keyframe { 4096 } else { 512 };
            let sample = Sample::new(
                vec![(display_index % 251) as u8; size],
                decode_index as i64 * duration,
                display_index as i64 * duration,
            )
            .with_duration(duration)
            .with_keyframe(keyframe)
            .with_byte_offset(offset);
            offset += size as i64;
            sample
        })
        .collect()
}

fn report(emitted: &[DecodedFrame], elapsed: Duration, key: ReorderKey) {
    let order: Vec<i64> = emitted
        .iter()
        .map(|frame| match key {
            ReorderKey::Decode => frame.decode_ts_us(),
            ReorderKey::Composition => frame.composition_ts_us(),
        })
        .collect();
    let in_order = order.windows(2).all(|pair| pair[0] <= pair[1]);

    for frame in emitted {
        println!("{}", frame);
    }
    println!(
        "{} frames in {:.1?} ({:?} order, {})",
        emitted.len(),
        elapsed,
        key,
        if in_order { "monotonic" } else { "OUT OF ORDER" }
    );
    if !in_order {
        tracing::warn!("Emitted frames are not monotonic by {:?} timestamp", key);
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "hwdec_pipeline=error,hwdec_sim=error",
        LogLevel::Warn => "hwdec_pipeline=warn,hwdec_sim=warn",
        LogLevel::Info => "hwdec_pipeline=info,hwdec_sim=info",
        LogLevel::Verbose => "hwdec_pipeline=debug,hwdec_sim=info",
        LogLevel::Debug => "hwdec_pipeline=debug,hwdec_sim=debug",
        LogLevel::Trace => "hwdec_pipeline=trace,hwdec_sim=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
