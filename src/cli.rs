//! Command-line interface for talkback
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Talk to a local language model and hear it answer
#[derive(Parser, Debug)]
#[command(
    name = "talkback",
    version = crate::VERSION,
    about = "Talk to a local language model and hear it answer"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Ollama model (default: llama3.2)
    #[arg(long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// How often idle workers re-check for interrupts. Examples: 100ms, 1s
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Print responses without speaking them
    #[arg(long, global = true)]
    pub no_speech: bool,

    /// Launch `ollama serve` in the background if the server is down
    #[arg(long, global = true)]
    pub start_server: bool,
}

/// Parse a duration string.
///
/// Supports any format accepted by `humantime` (`100ms`, `2s`, `1m30s`).
/// A bare number is taken as milliseconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → milliseconds
    let duration = match s.parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question, speak the answer, and exit
    Say {
        /// The prompt to send
        text: String,
    },

    /// Check system dependencies
    Check,

    /// View and manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
