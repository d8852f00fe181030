//! chatnet CLI - reply networks from exported chat transcripts
//!
//! Usage: chatnet-cli [OPTIONS] <COMMAND>
//!
//! Every command reads one transcript and prints a derived view of it. Supports
//! JSON output for scripting; logs go to stderr.

use chatnet_lib::drawing::DrawOptions;
use chatnet_lib::network::ChatNetwork;
use chatnet_lib::settings::{self, Settings};
use chatnet_lib::weights::{Normalization, WeightRequest};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[path = "cli/network_ops.rs"]
mod network_ops;

#[path = "cli/config_ops.rs"]
mod config_ops;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "chatnet-cli")]
#[command(version, about = "Reply networks from chat transcripts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Settings directory (default: platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parsed message records
    Parse {
        /// Exported transcript
        file: PathBuf,
        /// Keep consecutive messages from the same user as separate records
        #[arg(long)]
        no_collapse: bool,
    },
    /// Reply instances (source replied to target)
    Edges {
        file: PathBuf,
    },
    /// Weighted directed edge table
    Weights {
        file: PathBuf,
        /// Normalization for a single `weight` column
        #[arg(long, short, default_value = "count")]
        mode: String,
        /// Named output column, `name=mode` (repeatable, overrides --mode)
        #[arg(long = "column", short)]
        columns: Vec<String>,
    },
    /// Both directions of each user pair
    Pairs {
        file: PathBuf,
        /// Named output column, `name=mode` (repeatable)
        #[arg(long = "column", short)]
        columns: Vec<String>,
    },
    /// Node markers and edge segments for rendering
    Draw {
        file: PathBuf,
        /// Highlight these users (repeatable)
        #[arg(long = "select", short)]
        selected: Vec<String>,
        /// Size nodes by this normalization (default: settings `size_by`)
        #[arg(long)]
        size_by: Option<String>,
    },
    /// Settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print all settings
    Show,
    /// Get a setting value
    Get {
        /// Setting key
        key: String,
    },
    /// Set a setting value
    Set {
        /// Setting key
        key: String,
        /// Setting value
        value: String,
    },
    /// Print the settings file location
    Path,
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_network(file: &Path, settings: &Settings) -> Result<ChatNetwork, String> {
    ChatNetwork::from_file(file, &settings::parse_options(settings), settings::fit_options(settings))
        .map_err(|e| e.to_string())
}

/// `name=mode` pairs into a request; every mode is validated first.
fn parse_columns(columns: &[String]) -> Result<WeightRequest, String> {
    let pairs = columns
        .iter()
        .map(|c| {
            c.split_once('=')
                .map(|(name, mode)| (name.trim(), mode.trim()))
                .ok_or_else(|| format!("Expected name=mode, got {:?}", c))
        })
        .collect::<Result<Vec<_>, String>>()?;
    WeightRequest::parse(pairs).map_err(|e| e.to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Ignore SIGPIPE so piping through head/tail doesn't kill the process.
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    // println! panics on a closed pipe even with SIGPIPE ignored; exit quietly instead.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if info.to_string().contains("Broken pipe") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<(), String> {
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "chatnet-cli", &mut std::io::stdout());
        return Ok(());
    }

    let config_dir = cli
        .config_dir
        .clone()
        .or_else(settings::default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    settings::init(config_dir);
    let current = settings::get();

    match cli.command {
        Commands::Parse { file, no_collapse } => network_ops::handle_parse(&file, no_collapse, &current, cli.json),
        Commands::Edges { file } => network_ops::handle_edges(&file, &current, cli.json),
        Commands::Weights { file, mode, columns } => {
            let request = if columns.is_empty() {
                WeightRequest::single(Normalization::parse(&mode).map_err(|e| e.to_string())?)
            } else {
                parse_columns(&columns)?
            };
            network_ops::handle_weights(&file, &request, &current, cli.json)
        }
        Commands::Pairs { file, columns } => {
            let request = if columns.is_empty() {
                WeightRequest::single(Normalization::Count)
            } else {
                parse_columns(&columns)?
            };
            network_ops::handle_pairs(&file, &request, &current, cli.json)
        }
        Commands::Draw { file, selected, size_by } => {
            let mut options: DrawOptions = settings::draw_options(&current);
            if let Some(mode) = size_by {
                options.size_by = Normalization::parse(&mode).map_err(|e| e.to_string())?;
            }
            network_ops::handle_draw(&file, &selected, &options, &current, cli.json)
        }
        Commands::Config { cmd } => config_ops::handle_config(cmd, cli.json),
        Commands::Completions { .. } => Ok(()),
    }
}
