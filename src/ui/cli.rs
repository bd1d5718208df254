//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// upload-inspector: signature and heuristic threat analysis for uploaded files
#[derive(Parser, Debug)]
#[command(name = "upload-inspector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze one or more files
    Scan {
        /// Files to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Don't record the scans in the history database
        #[arg(long)]
        no_store: bool,

        /// Use a JSON rules file instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Show a stored scan by ID
    Show {
        /// Scan ID to show details for
        id: String,
    },

    /// Show recent scan history
    History {
        /// Number of recent scans to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List the loaded detection rules
    Rules {
        /// Use a JSON rules file instead of the built-in rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application information
    Info,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,

    /// Print configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
