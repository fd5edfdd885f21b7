//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Voice room occupancy logger.
///
/// Records when each participant enters and leaves each voice room as one
/// row per interval in a spreadsheet-shaped store.
#[derive(Debug, Parser)]
#[command(name = "vl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Consume transition events and record intervals.
    Run {
        /// Read JSON Lines events from stdin instead of the bridge command.
        #[arg(long)]
        stdin: bool,

        /// Keep records in memory only; nothing is written to the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the sheet and header row if needed.
    Init,

    /// List intervals that are still open in the store.
    Status {
        /// Output as JSON Lines.
        #[arg(long)]
        json: bool,
    },
}
