//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for parley
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about = "Local chat sessions with document retrieval")]
#[command(long_about = r#"
Parley runs a chat session against a local model, optionally grounding
answers in your own document collections, and keeps the conversation so it
can be resumed later.

Configuration files are loaded from (in priority order):
1. PARLEY_* environment variables (e.g. PARLEY_WORKER__THREADS=8)
2. --config <path>     Explicit config file
3. ./parley.toml       Project-level config
4. ~/.config/parley/config.toml   Global config

Example:
  parley chat --model echo --collection notes
  parley chat --load saved.chat --save saved.chat
  parley inspect ~/.local/share/parley/sessions/gpt4all-<id>.chat
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat session (default)
    Chat(ChatArgs),

    /// Decode a saved session file and print it
    Inspect {
        /// Session file to read
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Model to load (defaults to worker.default_model)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Enable a document collection (can be specified multiple times)
    #[arg(short, long = "collection", value_name = "NAME")]
    pub collections: Vec<String>,

    /// Resume the session stored in this file
    #[arg(long, value_name = "PATH")]
    pub load: Option<PathBuf>,

    /// Write the session to this file on exit
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
}
