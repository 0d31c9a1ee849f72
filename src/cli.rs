//! Command-line interface definition for Parlance
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat and session history
//! management.

use clap::{Parser, Subcommand};

/// Parlance - streaming conversation sessions for AI providers
///
/// Chat with a streaming provider, with sessions saved locally and
/// browsable afterwards.
#[derive(Parser, Debug, Clone)]
#[command(name = "parlance")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the session database path
    #[arg(long, env = "PARLANCE_HISTORY_DB")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Parlance
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Override the provider from config (openai, anthropic, ollama)
        #[arg(short, long)]
        provider: Option<String>,

        /// Resume a saved session by id
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Browse and manage saved sessions
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Session history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List saved sessions, most recent first
    List {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Include archived sessions
        #[arg(short, long)]
        archived: bool,
    },

    /// Search saved sessions by title and content
    Search {
        /// Search query
        query: String,
    },

    /// Delete a saved session
    Delete {
        /// Session id
        id: String,
    },

    /// Archive a saved session (hidden from the default list)
    Archive {
        /// Session id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
