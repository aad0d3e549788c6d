//! CLI module for Katamari
//!
//! Provides command-line interface for:
//! - start: Load configuration, start the server, block until shutdown
//! - verify: Replay a journal and report its contents

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{resolve_config, run, run_command, start, verify};
pub use errors::{CliError, CliErrorCode, CliResult};
