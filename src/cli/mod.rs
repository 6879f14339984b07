//! CLI module for the refcount index
//!
//! Provides command-line interface for:
//! - replay: Apply JSON-lines mutations to an in-memory store and scan the index
//! - plan: Print the counter operations one mutation implies

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{plan_from, replay_from, run, run_command, Config, Mutation, ReplayOptions};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_lines, read_request, write_error, write_response};
