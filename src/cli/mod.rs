//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// replica-probe - write-then-verify replication checker for Redis-compatible stores.
#[derive(Parser, Debug)]
#[command(name = "replica-probe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one probe against the configured primary and replica.
    Run(commands::RunArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
