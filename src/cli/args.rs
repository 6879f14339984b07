//! CLI argument definitions using clap
//!
//! Commands:
//! - aerodb-refcount replay --config <path> [--limit N] [--reverse] [--continuation <token>] [--rebuild]
//! - aerodb-refcount plan

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Refcount index maintenance over an in-memory record store
#[derive(Parser, Debug)]
#[command(name = "aerodb-refcount")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply JSON-lines mutations from stdin, then scan the index
    Replay {
        /// Path to configuration file
        #[arg(long, default_value = "./refcount.json")]
        config: PathBuf,

        /// Maximum entries in the scan page; 0 for no limit
        #[arg(long)]
        limit: Option<usize>,

        /// Scan in descending key order
        #[arg(long)]
        reverse: bool,

        /// Base64 continuation from a previous page
        #[arg(long)]
        continuation: Option<String>,

        /// Rebuild the index from the stored records before scanning
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the counter operations for one {old, new} request on stdin
    Plan,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
