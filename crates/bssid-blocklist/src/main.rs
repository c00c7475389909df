//! bbl: replay connection event traces through the BSSID blocklist engine.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use bssid_blocklist_core::FailureReason;
use bssid_blocklist_core::config::{Config, LogFormat};
use bssid_blocklist_core::error::format_error_with_remediation;
use bssid_blocklist_core::logging::init_logging;
use bssid_blocklist_core::replay::{Trace, replay_trace};

#[derive(Parser, Debug)]
#[command(name = "bbl", version, about = "BSSID blocklist engine trace replayer")]
struct Cli {
    /// Config file (defaults to <config dir>/bbl/config.toml when present)
    #[arg(long, global = true, env = "BBL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON event trace and print each step's outcome
    Replay {
        /// Path to the trace file
        trace: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Print the default configuration as TOML
    Defaults,

    /// List failure reasons with their thresholds and policy flags
    Reasons {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Debug, Serialize)]
struct ReasonRow {
    code: u8,
    name: &'static str,
    threshold: u32,
    watchdog_monitored: bool,
    low_rssi_sensitive: bool,
    reset_on_l2_success: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<bssid_blocklist_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config,
        log_level,
        log_format,
        command,
    } = cli;

    match command {
        Commands::Defaults => {
            print!("{}", Config::default().to_toml_string()?);
        }
        Commands::Replay { trace, format } => {
            let config = prepare(config.as_deref(), log_level, log_format)?;
            let loaded = Trace::load(&trace)?;
            tracing::info!(
                trace = %trace.display(),
                events = loaded.events.len(),
                "Replaying trace"
            );
            let report = replay_trace(&loaded, &config.blocklist)?;
            match format {
                OutputFormat::Pretty => print!("{report}"),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Reasons { format } => {
            let config = prepare(config.as_deref(), log_level, log_format)?;
            let rows: Vec<ReasonRow> = FailureReason::ALL
                .into_iter()
                .map(|reason| ReasonRow {
                    code: reason.code(),
                    name: reason.as_str(),
                    threshold: config.blocklist.thresholds.get(reason),
                    watchdog_monitored: reason.is_watchdog_monitored(),
                    low_rssi_sensitive: reason.is_low_rssi_sensitive(),
                    reset_on_l2_success: reason.is_l2_success_reset(),
                })
                .collect();
            match format {
                OutputFormat::Pretty => print_reasons(&rows),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
    }
    Ok(())
}

/// Load the config, then start logging with any command-line overrides.
fn prepare(
    path: Option<&Path>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
) -> anyhow::Result<Config> {
    let config = load_config(path)?;
    let mut log_config = config.logging.clone();
    if let Some(level) = log_level {
        log_config.level = level;
    }
    if let Some(format) = log_format {
        log_config.format = format;
    }
    init_logging(&log_config).context("failed to initialize logging")?;
    Ok(config)
}

/// An explicit path must exist; the per-user default is optional.
fn load_config(explicit: Option<&Path>) -> bssid_blocklist_core::Result<Config> {
    if let Some(path) = explicit {
        return Config::load_from(path);
    }
    match dirs::config_dir().map(|dir| dir.join("bbl").join("config.toml")) {
        Some(path) if path.is_file() => Config::load_from(&path),
        _ => Ok(Config::default()),
    }
}

fn print_reasons(rows: &[ReasonRow]) {
    println!(
        "{:>4}  {:<44} {:>9}  {:<8} {:<8} {:<8}",
        "CODE", "REASON", "THRESHOLD", "WATCHDOG", "LOW_RSSI", "L2_RESET"
    );
    for row in rows {
        println!(
            "{:>4}  {:<44} {:>9}  {:<8} {:<8} {:<8}",
            row.code,
            row.name,
            row.threshold,
            yes_no(row.watchdog_monitored),
            yes_no(row.low_rssi_sensitive),
            yes_no(row.reset_on_l2_success),
        );
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
