//! wavecap command-line tool
//!
//! Replays recorded captures through the capture engine, producing the
//! same handshake, PMKID and pcap artifacts a live sensor would, and
//! generates configuration files.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wavecap::{
    config::CaptureConfig, replay_source, CaptureEngine, CaptureError, CaptureEvent,
    CaptureListener, ConfigManager, FsStorage, ReplaySummary, Result,
};
use wavecap_radio::PcapFileSource;

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "/etc/wavecap/wavecap.toml";

/// Logs capture events as they happen
struct LogListener;

impl CaptureListener for LogListener {
    fn on_event(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::HandshakeCaptured { ap, sta, message } => {
                info!("Handshake {} captured: {} <-> {}", message, ap, sta)
            }
            CaptureEvent::PmkidCaptured { ap, ssid } => {
                info!("PMKID captured: {} ({})", ap, ssid)
            }
            CaptureEvent::CaptureRotated { path } => {
                info!("Capture rotated to {}", path.display())
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

fn build_cli() -> Command {
    Command::new("wavecap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("WPA handshake and PMKID capture engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (toml, json or yaml)")
                .default_value(DEFAULT_CONFIG_PATH)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .global(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output root directory, overrides the configuration")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("replay")
                .about("Feed recorded pcap files through the capture engine")
                .arg(
                    Arg::new("pcap")
                        .value_name("PCAP")
                        .help("Capture files (raw 802.11 or radiotap)")
                        .value_parser(clap::value_parser!(PathBuf))
                        .num_args(1..)
                        .required(true)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("channel")
                        .long("channel")
                        .value_name("N")
                        .help("Channel to record when a frame carries no radiotap channel")
                        .value_parser(clap::value_parser!(u8)),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration helpers")
                .subcommand_required(true)
                .subcommand(
                    Command::new("generate")
                        .about("Write the default configuration")
                        .arg(
                            Arg::new("file")
                                .value_name("FILE")
                                .help("Destination; the extension selects the format")
                                .value_parser(clap::value_parser!(PathBuf))
                                .required(true),
                        ),
                ),
        )
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    if let Err(e) = run(&matches).await {
        error!("wavecap error: {}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let manager = ConfigManager::load_or_default(&config_path)?;
    let loaded = manager.config_path().is_some();
    let warnings = manager.validate_config(manager.get_config()).warnings;
    let mut config = manager.into_config();

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.storage.output_dir = output.clone();
    }

    init_logging(&config.logging.level, &config.logging.format)?;
    if loaded {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!("Configuration file not found: {}, using defaults", config_path.display());
    }
    for warning in &warnings {
        warn!("Config: {}", warning);
    }

    match matches.subcommand() {
        Some(("replay", sub)) => {
            let files: Vec<PathBuf> = sub
                .get_many::<PathBuf>("pcap")
                .map(|files| files.cloned().collect())
                .unwrap_or_default();
            let channel = sub.get_one::<u8>("channel").copied();
            run_replay(&config, &files, channel).await
        }
        Some(("config", sub)) => match sub.subcommand() {
            Some(("generate", generate)) => {
                let file = generate
                    .get_one::<PathBuf>("file")
                    .ok_or_else(|| CaptureError::Config("No output file given".to_string()))?;
                generate_config(file)
            }
            _ => Err(CaptureError::Config("Unknown config command".to_string())),
        },
        _ => Err(CaptureError::Config("No command given".to_string())),
    }
}

/// Initialize logging system
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| CaptureError::Config(format!("Invalid log level '{}': {}", level, e)))?;

    match format {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .init(),
    }

    Ok(())
}

async fn run_replay(config: &CaptureConfig, files: &[PathBuf], channel: Option<u8>) -> Result<()> {
    let storage = FsStorage::new(&config.storage.output_dir);
    storage.prepare()?;
    info!("Writing artifacts under {}", storage.root().display());

    let mut engine = CaptureEngine::new(config, storage);
    engine.add_listener(Arc::new(LogListener));

    let mut total = ReplaySummary::default();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    for path in files {
        let mut source = PcapFileSource::open(path).await?;
        if let Some(channel) = channel {
            source = source.with_default_channel(channel);
        }

        tokio::select! {
            result = replay_source(&mut source, &mut engine) => {
                let summary = result?;
                info!("{}: {} frames", path.display(), summary.frames);
                total.merge(&summary);
            }
            _ = &mut shutdown => {
                warn!("Interrupted, stopping replay");
                break;
            }
        }
    }

    engine.flush()?;
    print_summary(&total, &engine);
    Ok(())
}

fn print_summary(total: &ReplaySummary, engine: &CaptureEngine) {
    let counters = engine.counters().snapshot();
    println!("Frames:      {}", total.frames);
    println!("Handshakes:  {} ({} duplicates)", counters.handshakes, counters.duplicates);
    println!("PMKIDs:      {}", counters.pmkids);
    if counters.storage_errors > 0 {
        println!("Dropped:     {}", counters.storage_errors);
    }
    match engine.current_capture_path() {
        Some(path) => println!("Capture:     {}", path.display()),
        None => println!("Capture:     (none)"),
    }
}

fn generate_config(path: &Path) -> Result<()> {
    ConfigManager::new().save_to_file(path)?;
    info!("Default configuration written to {}", path.display());
    println!("{}", path.display());
    Ok(())
}
