//! Run command implementation.

use crate::adapters::redis::{ConnectOptions, RedisClient};
use crate::core::config::{Config, ConfigOverrides};
use crate::core::error::{ProbeError, ProbeResult};
use crate::probe::{ReplicationProbe, VerifyOrder, WriteMode};
use crate::source::{HttpSource, RecordFields, SourceFetcher, StaticSource};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted when no password argument is given.
pub const PASSWORD_ENV: &str = "REPLICA_PROBE_PASSWORD";

/// Report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// The full run as JSON.
    Json,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Password shared by the primary and replica.
    #[arg(env = "REPLICA_PROBE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Number of records to fetch.
    #[arg(long)]
    pub count: Option<usize>,

    /// Entry TTL in seconds.
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Key namespace.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Write acknowledgment handling.
    #[arg(long, value_enum)]
    pub write_mode: Option<WriteMode>,

    /// Verification order.
    #[arg(long, value_enum)]
    pub order: Option<VerifyOrder>,

    /// Replica reads in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Do not print verified keys as they are found.
    #[arg(long)]
    pub no_echo: bool,

    /// Primary `host:port`.
    #[arg(long)]
    pub primary: Option<String>,

    /// Replica `host:port`.
    #[arg(long)]
    pub replica: Option<String>,

    /// Read records from a JSON file instead of the HTTP source.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Exit nonzero unless every attempted record was verified.
    #[arg(long)]
    pub require_all: bool,
}

impl RunArgs {
    fn overrides(&self, log_level: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            log_level,
            count: self.count,
            ttl_seconds: self.ttl,
            namespace: self.namespace.clone(),
            write_mode: self.write_mode,
            order: self.order,
            concurrency: self.concurrency,
            echo: self.no_echo.then_some(false),
            primary: self.primary.clone(),
            replica: self.replica.clone(),
        }
    }
}

/// The credential, or `MissingCredential` when none was supplied.
pub fn resolve_credential(password: Option<&str>) -> ProbeResult<String> {
    match password {
        Some(p) if !p.is_empty() => Ok(p.to_string()),
        _ => Err(ProbeError::MissingCredential {
            hint: format!(
                "pass the store password as an argument or set {}",
                PASSWORD_ENV
            ),
        }),
    }
}

/// Run one probe and print its report.
pub async fn run_probe(
    config_path: Option<&Path>,
    log_level: Option<String>,
    args: RunArgs,
) -> Result<()> {
    // Checked before anything touches the network or the filesystem.
    let password = resolve_credential(args.password.as_deref())?;

    let mut config = Config::load(config_path)?;
    config.apply_overrides(&args.overrides(log_level))?;
    config.validate()?;

    super::init_tracing(&config.telemetry.log_level);
    warn_if_endpoints_coincide(&config);

    let source: Box<dyn SourceFetcher> = match args.input {
        Some(ref path) => {
            let fields = RecordFields::new(&config.source.id_field, &config.source.text_field);
            Box::new(StaticSource::from_file(path, &fields)?)
        }
        None => Box::new(HttpSource::new(&config.source)?),
    };

    let primary = RedisClient::connect(&ConnectOptions::from_endpoint(&config.primary, &password))
        .await
        .context("failed to connect to primary")?;
    let replica = RedisClient::connect(&ConnectOptions::from_endpoint(&config.replica, &password))
        .await
        .context("failed to connect to replica")?;
    info!(primary = primary.endpoint(), replica = replica.endpoint(), "stores ready");

    let probe = ReplicationProbe::from_config(source, primary, replica, &config)?;
    let run = match args.format {
        OutputFormat::Text => {
            let mut stdout = std::io::stdout();
            probe.run_into(Some(&mut stdout)).await?
        }
        OutputFormat::Json => {
            let run = probe.with_echo(false).run_into(None).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
            run
        }
    };

    if args.require_all && !run.report.is_fully_replicated() {
        anyhow::bail!(
            "only {} of {} records verified on the replica",
            run.report.verified_count,
            run.report.attempted_count
        );
    }

    Ok(())
}

/// Warn when both roles point at one store; returns whether it warned.
fn warn_if_endpoints_coincide(config: &Config) -> bool {
    let coincide = config.endpoints_coincide();
    if coincide {
        warn!(
            endpoint = %config.primary.address(),
            "primary and replica are the same endpoint; every key will verify"
        );
    }
    coincide
}
