//! Config command implementation.

use crate::core::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults filled in.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(config_path),
        ConfigCommand::Show { format } => show_config(config_path, &format),
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load(path)?;
    match path {
        Some(path) => println!("✓ {} is valid", path.display()),
        None => println!("✓ No config file given, defaults are valid"),
    }
    println!(
        "  primary {} -> replica {}",
        config.primary.address(),
        config.replica.address()
    );
    if config.endpoints_coincide() {
        println!("  ⚠ Warning: primary and replica are the same endpoint");
    }
    Ok(())
}

fn show_config(path: Option<&Path>, format: &str) -> Result<()> {
    let config = Config::load(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => print!("{}", config.to_toml()?),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_rejects_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nttl_seconds = 0").unwrap();
        assert!(validate_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_show_unknown_format() {
        assert!(show_config(None, "yaml").is_err());
    }
}
