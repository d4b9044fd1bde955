//! Stillwatch CLI
//!
//! Runs the motion-capture loop against the configured camera, or against
//! a synthetic scene for bench testing without hardware.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stillwatch::{
    capture::{FrameSource, SyntheticCamera},
    config::FileConfig,
    metrics::{MetricsRegistry, MetricsReporter, StatusLine, StatusReporter, StatusSlot},
    motion::{MotionError, MotionLoop},
    storage::{EventSaver, FsSink, StatvfsGuard},
};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "stillwatch", version, about = "Adaptive motion capture for unattended cameras")]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a synthetic scene instead of the camera.
    #[arg(long)]
    synthetic: bool,

    /// Paint an intrusion into this synthetic frame number.
    #[arg(long, requires = "synthetic")]
    intrusion_at: Option<u64>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Overrides the storage root directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print a status line for every cycle.
    #[arg(long)]
    status: bool,
}

/// Prints each status line on its own line.
struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn report(&self, line: &StatusLine) {
        println!("{}", line);
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Stillwatch v{}", stillwatch::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(2);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(root) = &args.output {
        config.storage.root = root.clone();
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let result = if args.synthetic {
        let mut camera = SyntheticCamera::new(100).with_jitter(2);
        if let Some(at) = args.intrusion_at {
            camera = camera.with_intrusion(at, 250);
        }
        run(&args, &config, camera, shutdown)
    } else {
        run_camera(&args, &config, shutdown)
    };

    match result {
        Ok(()) => info!("Done"),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "camera")]
fn run_camera(
    args: &Args,
    config: &FileConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), MotionError> {
    run(args, config, stillwatch::capture::DeviceCamera::new(), shutdown)
}

#[cfg(not(feature = "camera"))]
fn run_camera(
    args: &Args,
    config: &FileConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), MotionError> {
    warn!("Built without the `camera` feature, using a synthetic scene");
    run(args, config, SyntheticCamera::new(100).with_jitter(2), shutdown)
}

fn run<S: FrameSource>(
    args: &Args,
    config: &FileConfig,
    source: S,
    shutdown: Arc<AtomicBool>,
) -> Result<(), MotionError> {
    let sink = match FsSink::new(&config.storage) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to prepare storage: {}", e);
            std::process::exit(1);
        }
    };
    let saver = match EventSaver::with_policy(
        Box::new(sink),
        config.storage.policy,
        config.storage.queue_depth,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start persistence: {}", e);
            std::process::exit(1);
        }
    };

    let mut motion = MotionLoop::new(config.loop_config(), source, saver)?
        .with_disk_guard(StatvfsGuard::new(config.storage.root.clone()))
        .with_shutdown(shutdown);

    match MetricsRegistry::new() {
        Ok(registry) => {
            let slot = StatusSlot::new();
            start_metrics_server(config, registry.clone(), slot.clone());
            motion = motion.with_reporter(MetricsReporter::new(registry, slot));
        }
        Err(e) => warn!("Metrics disabled: {}", e),
    }
    if args.status {
        motion = motion.with_reporter(ConsoleReporter);
    }

    let summary = motion.run(args.max_frames)?;
    info!(
        images = summary.images,
        events = summary.events,
        saved = summary.saves.saved,
        failed = summary.saves.failed,
        dark_sleeps = summary.dark_sleeps,
        stop = ?summary.stop_reason,
        "Run complete"
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn start_metrics_server(config: &FileConfig, registry: MetricsRegistry, slot: StatusSlot) {
    use stillwatch::metrics::{MetricsServer, MetricsServerConfig};

    if config.metrics.port == 0 {
        return;
    }
    let server = MetricsServer::new(
        MetricsServerConfig::with_port(config.metrics.port),
        registry,
        slot,
    );
    let spawned = std::thread::Builder::new()
        .name("stillwatch-http".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                warn!("Metrics server stopped: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn metrics server: {}", e);
    }
}

#[cfg(not(feature = "metrics"))]
fn start_metrics_server(_config: &FileConfig, _registry: MetricsRegistry, _slot: StatusSlot) {}
