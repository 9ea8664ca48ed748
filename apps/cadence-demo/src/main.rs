mod engine;

use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use cadence_runtime::{EventTopic, RewindSnapshot, Runtime, RuntimeConfig, RuntimeEvent};
use clap::Parser;
use crossbeam_channel::{Receiver, unbounded};
use engine::SyntheticEngine;
use tracing::{Level, debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::FmtSubscriber;

/// Runs a synthetic engine on the emulator thread and reports how well it is paced.
#[derive(Parser, Debug)]
#[command(name = "cadence-demo")]
#[command(about = "Emulator thread controller demo", long_about = None)]
struct Args {
    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 12)]
    duration: u64,

    /// Base frame rate
    #[arg(long, default_value_t = 60.0)]
    target_fps: f64,

    /// Fast-forward multiplier (0 = unthrottled)
    #[arg(long, default_value_t = 3.0)]
    fast_forward_multiplier: f32,

    /// Emulated work per frame, in ms
    #[arg(long, default_value_t = 6.0)]
    work_ms: f64,

    /// Random work jitter per frame (+/-), in ms
    #[arg(long, default_value_t = 3.0)]
    jitter_ms: f64,

    /// Scanlines rendered per step; below 263 a frame takes several steps
    #[arg(long, default_value_t = 263)]
    lines_per_step: u32,

    /// Seed for the work jitter
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Where the demo writes its save state (defaults to the temp dir)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// One scripted host action, run `at` seconds into the demo.
#[derive(Debug, Clone, Copy)]
enum Action {
    Pause,
    Resume,
    Reset,
    FastForward(bool),
    SaveState,
    LoadState,
    Rewind,
}

const SCRIPT: &[(u64, Action)] = &[
    (2, Action::Pause),
    (3, Action::Reset),
    (3, Action::Resume),
    (4, Action::FastForward(true)),
    (6, Action::FastForward(false)),
    (7, Action::SaveState),
    (8, Action::Reset),
    (9, Action::LoadState),
    (10, Action::Rewind),
];

fn init_tracing(args: &Args) -> Result<Option<WorkerGuard>> {
    let builder = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let Some(path) = &args.log_file else {
        tracing::subscriber::set_global_default(builder.finish())?;
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let file_name = path.file_name().context("--log-file must name a file")?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let subscriber = builder.with_ansi(false).with_writer(writer).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(Some(guard))
}

fn spawn_event_logger(rx: Receiver<RuntimeEvent>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("event-logger".into())
        .spawn(move || {
            for event in rx {
                match event.topic() {
                    EventTopic::Lifecycle => info!(?event, "runtime event"),
                    _ => debug!(?event, "runtime event"),
                }
            }
        })?;
    Ok(handle)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(&args)?;

    let config = RuntimeConfig {
        target_fps: args.target_fps,
        fast_forward_multiplier: args.fast_forward_multiplier,
        ..RuntimeConfig::default()
    };
    let engine = SyntheticEngine::new(
        Duration::from_secs_f64(args.work_ms.max(0.0) / 1000.0),
        Duration::from_secs_f64(args.jitter_ms.max(0.0) / 1000.0),
        args.lines_per_step,
        args.seed,
    );
    let runtime = Runtime::new(engine, config)?;

    let (event_tx, event_rx) = unbounded::<RuntimeEvent>();
    runtime.subscribe_event(EventTopic::Lifecycle, Box::new(event_tx.clone()));
    runtime.subscribe_event(EventTopic::Rumble, Box::new(event_tx));
    let logger = spawn_event_logger(event_rx)?;

    let state_file = args
        .state_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("cadence-demo.state"));
    let mut rewind_point: Option<[u8; 8]> = None;

    info!(
        target_fps = args.target_fps,
        work_ms = args.work_ms,
        jitter_ms = args.jitter_ms,
        "starting demo"
    );
    runtime.start()?;

    let started = Instant::now();
    let mut script = SCRIPT.iter().peekable();
    for second in 1..=args.duration {
        let tick = started + Duration::from_secs(second);
        thread::sleep(tick.saturating_duration_since(Instant::now()));

        info!(
            second,
            fps = runtime.observed_fps(),
            frames = runtime.frame_count(),
            state = ?runtime.run_state(),
            fast_forward = runtime.fast_forward(),
            "tick"
        );

        while let Some((_, action)) = script.next_if(|(at, _)| *at <= second) {
            debug!(?action, "running scripted action");
            match action {
                Action::Pause => runtime.pause(),
                Action::Resume => runtime.resume(),
                Action::Reset => runtime.reset_synchronized()?,
                Action::FastForward(enabled) => runtime.set_fast_forward(*enabled),
                Action::SaveState => runtime
                    .save_state_synchronized(&state_file)
                    .with_context(|| format!("saving {}", state_file.display()))?,
                Action::LoadState => runtime
                    .load_state_synchronized(&state_file)
                    .with_context(|| format!("loading {}", state_file.display()))?,
                Action::Rewind => {
                    if let Some(buffer) = rewind_point {
                        runtime.load_snapshot_synchronized(&RewindSnapshot {
                            buffer: &buffer,
                            screenshot: &[],
                            frame: u32::try_from(u64::from_le_bytes(buffer))
                                .unwrap_or(u32::MAX),
                        })?;
                    }
                }
            }
        }

        // Keep a rewind point one second behind for the scripted rewind.
        runtime.mutate_state_synchronized("capture_rewind_point", |engine| {
            rewind_point = Some(engine.snapshot_bytes());
            debug!(frame = engine.frame(), "captured rewind point");
            true
        })?;
    }

    runtime.stop();
    info!(frames = runtime.frame_count(), "demo finished");

    drop(runtime);
    let _ = logger.join();
    let _ = std::fs::remove_file(&state_file);
    Ok(())
}
