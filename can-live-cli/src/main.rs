//! CAN Live Decoder CLI Application
//!
//! Command-line front end for the can-live-decoder library:
//! - Listens on a SocketCAN interface or replays a candump log
//! - Prints every delivered result (text or JSON lines)
//! - Keeps a dashboard of the latest readings
//! - Stops cleanly on Ctrl-C

use anyhow::{bail, Context, Result};
use can_live_decoder::{CandumpReplay, Listener, ResultChannel, Transport};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

mod config;
mod report;
mod state;

use config::{AppConfig, OutputFormat, TransportKind};
use state::Dashboard;

/// CAN Live Decoder - Decode vehicle CAN frames as they arrive
#[derive(Parser, Debug)]
#[command(name = "can-live-cli")]
#[command(about = "Decode CAN frames live from SocketCAN or a candump log", long_about = None)]
#[command(version)]
struct Args {
    /// SocketCAN interface to listen on (e.g. can0, vcan0)
    #[arg(short, long, value_name = "IFACE")]
    interface: Option<String>,

    /// Replay a candump log instead of listening on an interface
    #[arg(short, long, value_name = "FILE", conflicts_with = "interface")]
    replay: Option<PathBuf>,

    /// Replay at the recorded pace
    #[arg(long, requires = "replay")]
    realtime: bool,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Stop after this many results
    #[arg(long, value_name = "COUNT")]
    max_results: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Live Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_live_decoder::VERSION);

    let config = resolve_config(&args)?;
    run(&config, &args)
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(interface) = &args.interface {
        config.transport.kind = TransportKind::Socketcan;
        config.transport.interface = interface.clone();
    }
    if let Some(file) = &args.replay {
        config.transport.kind = TransportKind::Candump;
        config.transport.file = Some(file.clone());
    }
    if args.realtime {
        config.transport.realtime = true;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }

    config.validate()?;
    Ok(config)
}

fn build_transport(config: &AppConfig) -> Result<Box<dyn Transport>> {
    let transport = &config.transport;
    match transport.kind {
        TransportKind::Candump => {
            let Some(file) = &transport.file else {
                bail!("No candump file configured");
            };
            Ok(Box::new(
                CandumpReplay::from_path(file).with_realtime(transport.realtime),
            ))
        }
        TransportKind::Socketcan => socketcan_transport(config),
    }
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn socketcan_transport(config: &AppConfig) -> Result<Box<dyn Transport>> {
    let timeout = match config.transport.read_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    Ok(Box::new(
        can_live_decoder::SocketCanTransport::new(config.transport.interface.clone())
            .with_read_timeout(timeout),
    ))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn socketcan_transport(config: &AppConfig) -> Result<Box<dyn Transport>> {
    bail!(
        "Cannot listen on {:?}: built without SocketCAN support (rebuild with --features socketcan on Linux, or use --replay)",
        config.transport.interface
    )
}

fn run(config: &AppConfig, args: &Args) -> Result<()> {
    let transport = build_transport(config)?;

    let channel = ResultChannel::from_config(&config.listener);
    let receiver = channel.subscribe();

    let mut listener = Listener::new(transport, channel).with_config(config.listener.clone());
    listener.start().context("Failed to start listener")?;

    let stop = listener.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, stopping listener");
        stop.request_stop();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut dashboard = Dashboard::new();
    let mut shown = 0usize;
    let stdout = io::stdout();

    loop {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(delivery) => {
                dashboard.apply(&delivery.response);
                let line = report::format_delivery(&delivery, &config.output)?;
                writeln!(stdout.lock(), "{}", line)?;

                shown += 1;
                if args.max_results.is_some_and(|max| shown >= max) {
                    log::info!("Reached {} results, stopping", shown);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) if listener.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = listener.stop();

    // Results queued between the last receive and the stop
    if args.max_results.is_none() {
        for delivery in receiver.drain() {
            dashboard.apply(&delivery.response);
            writeln!(stdout.lock(), "{}", report::format_delivery(&delivery, &config.output)?)?;
        }
    }

    if !args.quiet && config.output.format == OutputFormat::Text {
        println!();
        print!("{}", report::format_summary(&stats, &dashboard));
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
