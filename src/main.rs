//! replica-probe - unified CLI entrypoint.
//!
//! Usage:
//!   replica-probe run [PASSWORD] [--config probe.toml] [--count N] [--ttl SECS]
//!   replica-probe config validate --config probe.toml
//!   replica-probe config show [--format json]
//!
//! The password may also come from `REPLICA_PROBE_PASSWORD`.

use anyhow::Result;
use clap::Parser;
use replica_probe::cli::commands::{run_config, run_probe};
use replica_probe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => run_probe(config_path, cli.log_level, args).await,
        Commands::Config(args) => run_config(args, config_path),
    }
}
