//! Command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "leadsync")]
#[command(about = "Marketing event synchronization and lead deduplication engine")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: leadsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Source platform of an event export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Platform {
    Lemlist,
    Smartlead,
}

impl Platform {
    /// The service name this platform maps to.
    pub fn service_name(self) -> &'static str {
        match self {
            Platform::Lemlist => "lemlist",
            Platform::Smartlead => "smartlead",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import platform events from a JSON-lines export, assigning keys
    Import {
        /// Input file, one native platform event per line
        file: PathBuf,
        /// Platform the export came from
        #[arg(short, long, value_enum)]
        platform: Platform,
        /// Service profile used for pacing (default: the platform name)
        #[arg(short, long)]
        service: Option<String>,
        /// Output file for keyed events (default: <file>.keyed.jsonl)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fail instead of reporting partial completion when retries run out
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Generate keys for an export without importing (dry run)
    Keys {
        /// Input file, one native platform event per line
        file: PathBuf,
        /// Platform the export came from
        #[arg(short, long, value_enum)]
        platform: Platform,
    },

    /// Show effective rate and batch limits
    Limits {
        /// Service name (all known services when omitted)
        service: Option<String>,
    },
}

/// Parse arguments and dispatch to the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Import {
            file,
            platform,
            service,
            output,
            stop_on_error,
        } => {
            commands::cmd_import(
                &settings,
                &file,
                platform,
                service.as_deref(),
                output.as_deref(),
                stop_on_error,
            )
            .await
        }
        Commands::Keys { file, platform } => commands::cmd_keys(&settings, &file, platform).await,
        Commands::Limits { service } => commands::cmd_limits(&settings, service.as_deref()),
    }
}
