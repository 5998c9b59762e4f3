//! # Flight TestPilot
//!
//! Records flight-test telemetry into per-activity CSV tables and analyses
//! them after the flight.
//!
//! The recorder reads the ground station feed on stdin, one JSON message or
//! operator command per line:
//!
//! ```text
//! tp aircraft Sky Hopper
//! tp start power run1
//! {"type":"SYS_STATUS","fields":{"current_battery":1250,"voltage_battery":15900}}
//! {"type":"VFR_HUD","fields":{"airspeed":14.2,"alt":120.0}}
//! tp stop run1
//! ```
//!
//! Stopping a `power` activity smooths power against airspeed and writes the
//! performance report next to the recording.
//!
//! # Examples
//!
//! ```bash
//! mavlink-json-bridge | testpilot --config config/default.toml record
//! testpilot analyze flights/run1.csv
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{self, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use flight_testpilot::command::TestPilot;
use flight_testpilot::config::{Config, LoggingConfig};
use flight_testpilot::telemetry::feed::{FeedEvent, MessageFeed};

/// Log file name prefix inside `[logging] log_dir`.
const LOG_FILE_PREFIX: &str = "testpilot.log";

#[derive(Parser, Debug)]
#[command(author, version, about = "Flight-test telemetry logger and performance analysis", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long, env = "TESTPILOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Mode {
    /// Record activities from the JSON-lines feed on stdin (default)
    Record,
    /// Run the power analysis on a recorded CSV file
    Analyze {
        /// Recording written by a power activity
        csv: PathBuf,
    },
}

/// Sets up console logging, plus daily rolling files when configured.
///
/// `RUST_LOG` overrides the configured level. The returned guard must live
/// until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Runs the recorder until the feed ends or Ctrl+C.
///
/// Activities still recording at exit are stopped and analysed.
async fn record(pilot: &mut TestPilot) -> Result<()> {
    let mut feed = MessageFeed::new(BufReader::new(io::stdin()));
    let mut stdout = io::stdout();

    info!("Recording to {}", pilot.settings().directory().display());
    info!("Reading telemetry feed from stdin; press Ctrl+C to exit");

    let mut messages: u64 = 0;

    loop {
        tokio::select! {
            event = feed.next_event() => {
                match event.context("telemetry feed failed")? {
                    Some(FeedEvent::Message(msg)) => {
                        pilot.on_message(msg);
                        messages += 1;
                    }
                    Some(FeedEvent::Command(line)) => {
                        let reply = pilot.handle_command(&line);
                        stdout.write_all(reply.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                    None => {
                        info!("Telemetry feed closed");
                        break;
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Processed {} telemetry messages", messages);
    for line in pilot.shutdown() {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}

fn analyze(pilot: &mut TestPilot, csv: &Path) -> Result<()> {
    if !csv.is_file() {
        anyhow::bail!("File '{}' does not exist", csv.display());
    }
    let summary = pilot
        .analyze_file(csv)
        .with_context(|| format!("power analysis of {} failed", csv.display()))?;
    println!("{}", summary);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_logging(&config.logging);

    info!("Flight TestPilot v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut pilot = TestPilot::new(config);
    match cli.command.unwrap_or(Mode::Record) {
        Mode::Record => record(&mut pilot).await,
        Mode::Analyze { csv } => analyze(&mut pilot, &csv),
    }
}
