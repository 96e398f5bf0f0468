//! Configuration parsing and validation.
//!
//! Probe configuration is loaded from an optional TOML file with CLI overrides.
//! Every section has defaults, so `Config::default()` describes a complete run
//! against local stores. The store credential is not part of it: it is
//! supplied per invocation and never persisted.

use crate::probe::ingest::WriteMode;
use crate::probe::key::KEY_SEPARATOR;
use crate::probe::verify::VerifyOrder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream record source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Primary store receiving writes.
    #[serde(default)]
    pub primary: StoreEndpointConfig,

    /// Replica store answering reads. Defaults to port 13258 when the
    /// section is absent.
    #[serde(default = "StoreEndpointConfig::replica")]
    pub replica: StoreEndpointConfig,

    /// Ingestion policy.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Verification policy.
    #[serde(default)]
    pub verify: VerifyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            primary: StoreEndpointConfig::default(),
            replica: StoreEndpointConfig::replica(),
            ingest: IngestConfig::default(),
            verify: VerifyConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Primary and replica resolve to the same `host:port`, so every read
    /// is answered by the store that took the write.
    pub fn endpoints_coincide(&self) -> bool {
        self.primary.address() == self.replica.address()
    }
}

/// HTTP record source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Human-readable source name used in reports.
    #[serde(default = "default_source_name")]
    pub name: String,

    /// Base URL of the upstream API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the batch endpoint, appended to `base_url`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Query parameter carrying the requested batch size.
    #[serde(default = "default_count_param")]
    pub count_param: String,

    /// Number of records requested per run.
    #[serde(default = "default_count")]
    pub count: usize,

    /// JSON field holding the record identifier.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// JSON field holding the record text.
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Optional whole-request timeout in milliseconds. Unset means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            base_url: default_base_url(),
            path: default_path(),
            count_param: default_count_param(),
            count: default_count(),
            id_field: default_id_field(),
            text_field: default_text_field(),
            timeout_ms: None,
        }
    }
}

/// Connection settings for one store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEndpointConfig {
    /// Host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database index selected after connecting.
    #[serde(default)]
    pub database: u32,

    /// ACL username. When unset, `AUTH` is sent with the password only.
    #[serde(default)]
    pub username: Option<String>,

    /// Connect timeout in milliseconds (bootstrap only; requests have none).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for StoreEndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: 0,
            username: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl StoreEndpointConfig {
    /// Default replica endpoint.
    pub fn replica() -> Self {
        Self {
            port: default_replica_port(),
            ..Self::default()
        }
    }

    /// `host:port` address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Key namespace; keys are `<namespace>:<identifier>`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// TTL applied to every written entry.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Whether writes are awaited individually or dispatched best-effort.
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            ttl_seconds: default_ttl_seconds(),
            write_mode: WriteMode::default(),
        }
    }
}

/// Verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Order in which attempted keys are read back.
    #[serde(default)]
    pub order: VerifyOrder,

    /// Maximum reads in flight. 1 is strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Print each present key as it is found.
    #[serde(default = "default_echo")]
    pub echo: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            order: VerifyOrder::default(),
            concurrency: default_concurrency(),
            echo: default_echo(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_source_name() -> String {
    "Cat Facts".to_string()
}

fn default_base_url() -> String {
    "https://cat-fact.herokuapp.com".to_string()
}

fn default_path() -> String {
    "/facts/random".to_string()
}

fn default_count_param() -> String {
    "amount".to_string()
}

fn default_count() -> usize {
    100
}

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_replica_port() -> u16 {
    13258
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_namespace() -> String {
    "fact".to_string()
}

fn default_ttl_seconds() -> u64 {
    120
}

fn default_concurrency() -> usize {
    1
}

fn default_echo() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Call `validate()` afterwards; overrides are not checked here.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(count) = overrides.count {
            self.source.count = count;
        }
        if let Some(ttl_seconds) = overrides.ttl_seconds {
            self.ingest.ttl_seconds = ttl_seconds;
        }
        if let Some(ref namespace) = overrides.namespace {
            self.ingest.namespace = namespace.clone();
        }
        if let Some(write_mode) = overrides.write_mode {
            self.ingest.write_mode = write_mode;
        }
        if let Some(order) = overrides.order {
            self.verify.order = order;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.verify.concurrency = concurrency;
        }
        if let Some(echo) = overrides.echo {
            self.verify.echo = echo;
        }
        if let Some(ref primary) = overrides.primary {
            let (host, port) = parse_endpoint(primary)?;
            self.primary.host = host;
            self.primary.port = port;
        }
        if let Some(ref replica) = overrides.replica {
            let (host, port) = parse_endpoint(replica)?;
            self.replica.host = host;
            self.replica.port = port;
        }
        Ok(())
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_source()?;
        self.validate_endpoint("primary", &self.primary)?;
        self.validate_endpoint("replica", &self.replica)?;
        self.validate_ingest()?;
        self.validate_verify()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_source(&self) -> Result<()> {
        let source = &self.source;
        if !source.base_url.starts_with("http://") && !source.base_url.starts_with("https://") {
            anyhow::bail!(
                "source.base_url must start with http:// or https://, got: {}",
                source.base_url
            );
        }
        if source.count == 0 {
            anyhow::bail!("source.count must be > 0");
        }
        if source.count_param.is_empty() {
            anyhow::bail!("source.count_param must not be empty");
        }
        if source.id_field.is_empty() || source.text_field.is_empty() {
            anyhow::bail!("source.id_field and source.text_field must not be empty");
        }
        if source.timeout_ms == Some(0) {
            anyhow::bail!("source.timeout_ms must be > 0 when set");
        }
        Ok(())
    }

    fn validate_endpoint(&self, prefix: &str, endpoint: &StoreEndpointConfig) -> Result<()> {
        if endpoint.host.is_empty() {
            anyhow::bail!("{}.host must not be empty", prefix);
        }
        if endpoint.port == 0 {
            anyhow::bail!("{}.port must be > 0", prefix);
        }
        if endpoint.connect_timeout_ms == 0 {
            anyhow::bail!("{}.connect_timeout_ms must be > 0", prefix);
        }
        Ok(())
    }

    fn validate_ingest(&self) -> Result<()> {
        if self.ingest.ttl_seconds == 0 {
            anyhow::bail!("ingest.ttl_seconds must be > 0");
        }
        if self.ingest.namespace.is_empty() {
            anyhow::bail!("ingest.namespace must not be empty");
        }
        if self
            .ingest
            .namespace
            .chars()
            .any(|c| c.is_whitespace() || c == KEY_SEPARATOR)
        {
            anyhow::bail!(
                "ingest.namespace must not contain whitespace or '{}', got: {:?}",
                KEY_SEPARATOR,
                self.ingest.namespace
            );
        }
        Ok(())
    }

    fn validate_verify(&self) -> Result<()> {
        if self.verify.concurrency == 0 {
            anyhow::bail!("verify.concurrency must be >= 1");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// Split a `host:port` string.
pub fn parse_endpoint(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .with_context(|| format!("endpoint must be host:port, got: {}", value))?;
    if host.is_empty() {
        anyhow::bail!("endpoint host must not be empty, got: {}", value);
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid port in endpoint: {}", value))?;
    Ok((host.to_string(), port))
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override batch size.
    pub count: Option<usize>,
    /// Override entry TTL.
    pub ttl_seconds: Option<u64>,
    /// Override key namespace.
    pub namespace: Option<String>,
    /// Override write mode.
    pub write_mode: Option<WriteMode>,
    /// Override verification order.
    pub order: Option<VerifyOrder>,
    /// Override read concurrency.
    pub concurrency: Option<usize>,
    /// Override echo.
    pub echo: Option<bool>,
    /// Override primary `host:port`.
    pub primary: Option<String>,
    /// Override replica `host:port`.
    pub replica: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.ingest.namespace, "fact");
        assert_eq!(config.ingest.ttl_seconds, 120);
        assert_eq!(config.source.count, 100);
        assert_eq!(config.verify.order, VerifyOrder::Reverse);
        assert_eq!(config.ingest.write_mode, WriteMode::BestEffort);
        assert_eq!(config.verify.concurrency, 1);
        assert!(config.verify.echo);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.primary.address(), "127.0.0.1:6379");
        assert_eq!(config.replica.address(), "127.0.0.1:13258");
        assert!(!config.endpoints_coincide());
        assert_eq!(config.source.id_field, "_id");
    }

    #[test]
    fn test_endpoints_coincide() {
        assert!(!Config::default().endpoints_coincide());

        let config = Config::from_toml("[replica]\nport = 6379\n").unwrap();
        assert!(config.endpoints_coincide());

        let mut config = Config::default();
        config
            .apply_overrides(&ConfigOverrides {
                replica: Some("127.0.0.1:6379".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(config.endpoints_coincide());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
[ingest]
ttl_seconds = 30
write_mode = "await_each"

[verify]
order = "forward"
concurrency = 4

[replica]
host = "10.0.0.2"
port = 13258
"#,
        )
        .unwrap();
        assert_eq!(config.ingest.ttl_seconds, 30);
        assert_eq!(config.ingest.namespace, "fact");
        assert_eq!(config.ingest.write_mode, WriteMode::AwaitEach);
        assert_eq!(config.verify.order, VerifyOrder::Forward);
        assert_eq!(config.verify.concurrency, 4);
        assert_eq!(config.replica.address(), "10.0.0.2:13258");
        assert_eq!(config.replica.connect_timeout_ms, 5_000);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = Config::from_toml("[ingest]\nttl_seconds = 0\n").unwrap_err();
        assert!(err.to_string().contains("ttl_seconds"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::from_toml("[verify]\nconcurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let err = Config::from_toml("[source]\nbase_url = \"ftp://example\"\n").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let err = Config::from_toml("[telemetry]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            count: Some(5),
            ttl_seconds: Some(1),
            namespace: Some("probe".to_string()),
            order: Some(VerifyOrder::Forward),
            echo: Some(false),
            replica: Some("replica.internal:13258".to_string()),
            ..Default::default()
        };
        config.apply_overrides(&overrides).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.count, 5);
        assert_eq!(config.ingest.ttl_seconds, 1);
        assert_eq!(config.ingest.namespace, "probe");
        assert_eq!(config.verify.order, VerifyOrder::Forward);
        assert!(!config.verify.echo);
        assert_eq!(config.replica.host, "replica.internal");
        assert_eq!(config.replica.port, 13258);
        assert_eq!(config.primary.port, 6379);
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("35.226.158.112:6379").unwrap(),
            ("35.226.158.112".to_string(), 6379)
        );
        assert!(parse_endpoint("no-port").is_err());
        assert!(parse_endpoint(":6379").is_err());
        assert!(parse_endpoint("host:99999").is_err());
    }

    #[test]
    fn test_toml_roundtrip_is_loadable() {
        let rendered = Config::default().to_toml().unwrap();
        let reloaded = Config::from_toml(&rendered).unwrap();
        assert_eq!(reloaded.ingest.ttl_seconds, 120);
        assert_eq!(reloaded.source.base_url, "https://cat-fact.herokuapp.com");
    }
}
