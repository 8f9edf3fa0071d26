//! `kprodatalog`: record datalogs from a KPro ECU, or play a recorded
//! datalog back to a logger as if it were the ECU.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kprodatalog_core::config::DatalogConfig;
use kprodatalog_core::frame::DatalogFrame;
use kprodatalog_core::protocol::{
    list_ports, open_port, CaptureReport, CaptureSession, ReplaySession, SimulatedEcu, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Poll the ECU and record a datalog
    Capture,
    /// Answer poll requests from a recorded datalog
    Replay,
}

#[derive(Debug, Parser)]
#[command(
    name = "kprodatalog",
    author,
    version,
    about = "KPro datalog capture and replay tool",
    long_about = None
)]
struct Cli {
    #[arg(
        short,
        long,
        value_enum,
        required_unless_present = "list_ports",
        help = "Mode of operation"
    )]
    mode: Option<Mode>,

    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present = "list_ports",
        help = "KManager format .kdl datalog file"
    )]
    datalog: Option<PathBuf>,

    #[arg(short, long, help = "Don't display datalog frames while processing")]
    quiet: bool,

    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v debug, -vv trace)"
    )]
    verbose: u8,

    #[arg(short, long, value_name = "NAME", help = "Serial port (autodetected when omitted)")]
    port: Option<String>,

    #[arg(long, value_name = "SECS", help = "Stop capturing after this many seconds")]
    duration: Option<u64>,

    #[arg(short, long, value_name = "FILE", help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Capture from a simulated ECU instead of a serial device")]
    demo: bool,

    #[arg(long, help = "List serial ports and exit")]
    list_ports: bool,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<DatalogConfig> {
    let mut config = match &cli.config {
        Some(path) => DatalogConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DatalogConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(secs) = cli.duration {
        config.capture.max_duration_ms = secs.saturating_mul(1000);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_transport(cli: &Cli, config: &DatalogConfig) -> Result<Box<dyn Transport>> {
    if cli.demo {
        info!("Using simulated ECU");
        return Ok(Box::new(SimulatedEcu::default()));
    }
    let transport = open_port(&config.serial).context("failed to open KPro serial port")?;
    Ok(Box::new(transport))
}

/// Overwrite the current console line with the frame summary
fn print_frame(frame: &DatalogFrame) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "{}\r", frame.summary());
    let _ = stdout.flush();
}

/// Cancel `token` on Ctrl-C so the session stops at its next check
fn cancel_on_ctrl_c(token: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .context("failed to install Ctrl-C handler")
}

/// Run the capture to completion, then write what it recorded to `path`.
///
/// The file is only created once the session has ended, so a failed run
/// leaves any earlier datalog at `path` untouched.
fn record<T: Transport>(session: &mut CaptureSession<T>, path: &Path) -> Result<CaptureReport> {
    let report = session.run().context("capture failed")?;

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut sink = BufWriter::new(file);
    session
        .write_to(&mut sink)
        .with_context(|| format!("failed to write {}", path.display()))?;
    sink.flush()?;
    Ok(report)
}

fn run_capture(cli: &Cli, config: &DatalogConfig, path: &Path) -> Result<()> {
    let transport = open_transport(cli, config)?;

    let mut session = CaptureSession::new(transport, config.capture.clone());
    if !cli.quiet {
        session = session.on_frame(print_frame);
    }
    cancel_on_ctrl_c(session.cancellation_token())?;

    let report = record(&mut session, path)?;
    if !cli.quiet {
        println!();
    }
    if report.cancelled {
        info!("Capture interrupted, keeping {} recorded frames", report.frames);
    }

    info!(
        "Wrote {} frames to {} ({} polls, {} failed, {} resets)",
        report.frames,
        path.display(),
        report.polls,
        report.failed_polls,
        report.resets
    );
    Ok(())
}

fn run_replay(cli: &Cli, config: &DatalogConfig, path: &Path) -> Result<()> {
    if cli.demo {
        bail!("--demo is only supported in capture mode");
    }
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let transport = open_transport(cli, config)?;

    let mut session = ReplaySession::new(transport, config.replay.clone());
    if !cli.quiet {
        session = session.on_frame(print_frame);
    }
    cancel_on_ctrl_c(session.cancellation_token())?;
    let report = session
        .run(BufReader::new(file))
        .with_context(|| format!("failed to replay {}", path.display()))?;
    if !cli.quiet {
        println!();
    }

    info!(
        "Replayed {} frames, answered {} requests ({} unknown)",
        report.frames_played, report.requests_served, report.unknown_requests
    );
    Ok(())
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    for port in ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "----:----".to_string(),
        };
        println!(
            "{:<20} {} {}{}",
            port.name,
            ids,
            port.product.as_deref().unwrap_or(""),
            if port.is_kpro() { "  [KPro]" } else { "" }
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_ports {
        print_ports();
        return Ok(());
    }

    let config = load_config(&cli)?;
    let (Some(mode), Some(path)) = (cli.mode, cli.datalog.clone()) else {
        bail!("--mode and --datalog are required");
    };

    match mode {
        Mode::Capture => run_capture(&cli, &config, &path),
        Mode::Replay => run_replay(&cli, &config, &path),
    }
}
