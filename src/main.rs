use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use mindscope_telemetry::{
    run_connection, CommandOutcome, Console, ExportDocument, Multiplexer, OperatorCommand,
    TelemetryConfig,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "mindscope-telemetry",
    version,
    about = "Live telemetry console for the MindScope instrument backend",
    long_about = "Connects to the session backend, drives the gauge and rolling timeline, and \
                  reads operator commands (set, release, pause, resume, pan <n>, zoom in|out, \
                  sensitivity <v>, smoothing <v>, tone <v>, record start|stop, export [path], \
                  status) from stdin, one per line."
)]
struct Args {
    /// Backend WebSocket URL
    #[arg(long, env = "MINDSCOPE_URL")]
    url: Option<String>,

    /// Heartbeat interval in seconds (0 disables)
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Frame rate of the render loop
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Plot width used to project the strip chart
    #[arg(long, default_value_t = 800.0)]
    plot_width: f64,

    /// Print each frame's render state as a JSON line on stdout
    #[arg(long)]
    emit_frames: bool,

    /// Seconds between status lines in the log
    #[arg(long, default_value_t = 10)]
    status_secs: u64,

    /// Directory for exports written without an explicit path
    #[arg(long, env = "MINDSCOPE_EXPORT_DIR", default_value = "exports")]
    export_dir: PathBuf,

    /// Write an export when shutting down
    #[arg(long)]
    export_on_exit: bool,

    /// Restore the timeline from an export file before connecting
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "mindscope_telemetry=info",
        1 => "mindscope_telemetry=debug",
        _ => "mindscope_telemetry=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn write_export(document: &ExportDocument, path: Option<&Path>, export_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => export_dir.join(format!(
            "mindscope-{}.json",
            document.exported_at.format("%Y%m%d-%H%M%S")
        )),
    };
    document.save_to_file(&path)?;
    Ok(path)
}

fn handle_line(console: &Mutex<Console>, line: &str, export_dir: &Path) {
    if line.trim().is_empty() {
        return;
    }
    let command: OperatorCommand = match line.parse() {
        Ok(command) => command,
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    let outcome = console.lock().apply_command(&command, Instant::now());
    match outcome {
        CommandOutcome::Applied => debug!("Applied {:?}", command),
        CommandOutcome::Calibrated(outcome) => info!("Calibration: {:?}", outcome),
        CommandOutcome::Viewport(viewport) => debug!("Viewport now {:?}", viewport),
        CommandOutcome::Status(line) => info!("{}", line),
        CommandOutcome::Export { document, path } => {
            match write_export(&document, path.as_deref(), export_dir) {
                Ok(path) => info!(
                    "💾 Exported {} samples to {}",
                    document.signal.samples.len(),
                    path.display()
                ),
                Err(e) => warn!("Export failed: {:#}", e),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("🚀 Starting MindScope telemetry console");

    let mut config = TelemetryConfig::from_env().context("Invalid environment configuration")?;
    if let Some(url) = &args.url {
        config.connection.url = url.clone();
    }
    if let Some(secs) = args.heartbeat_secs {
        config.connection.heartbeat_interval_secs = secs;
    }
    config.validate().context("Invalid configuration")?;

    let mux = Multiplexer::new(&config.connection);
    let console = Arc::new(Mutex::new(Console::new(&config)));

    if let Some(path) = &args.restore {
        let document = ExportDocument::load_from_file(path)?;
        console
            .lock()
            .restore(&document)
            .with_context(|| format!("Failed to restore {}", path.display()))?;
    }

    let subscriptions = Console::attach(&console, &mux);
    let cancel = CancellationToken::new();
    let connection = tokio::spawn(run_connection(
        mux.clone(),
        config.connection.clone(),
        cancel.clone(),
    ));

    let mut frames = time::interval(Duration::from_secs_f64(1.0 / args.fps.max(1) as f64));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = time::interval(Duration::from_secs(args.status_secs.max(1)));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }

            tick = frames.tick() => {
                let state = console.lock().tick(tick.into_std(), args.plot_width);
                if let Some(outcome) = &state.gauge.calibration {
                    info!("Calibration: {:?}", outcome);
                }
                if args.emit_frames {
                    match serde_json::to_string(&state) {
                        Ok(json) => println!("{}", json),
                        Err(e) => warn!("Failed to serialize frame: {}", e),
                    }
                }
            }

            _ = status.tick() => {
                let line = console.lock().status_line();
                info!("{} | link {}", line, if mux.is_connected() { "up" } else { "down" });
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&console, &line, &args.export_dir),
                Ok(None) => {
                    debug!("stdin closed, operator commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read operator command: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    cancel.cancel();
    connection.await.context("Connection task panicked")?;
    for subscription in subscriptions {
        subscription.unsubscribe();
    }

    if args.export_on_exit {
        let document = console.lock().export(Utc::now());
        let path = write_export(&document, None, &args.export_dir)?;
        info!("💾 Final export written to {}", path.display());
    }

    Ok(())
}
