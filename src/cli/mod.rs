//! Command-line interface for stackctl.
//!
//! This module provides argument parsing and output formatting
//! for the deploy, rm, ls, services and validate commands.

mod commands;
mod output;

pub use commands::{Cli, Commands, DaemonArgs, OutputFormat};
pub use output::OutputFormatter;
