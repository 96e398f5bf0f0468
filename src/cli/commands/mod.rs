//! CLI command implementations.

mod config;
mod run;

pub use config::{run_config, ConfigArgs};
pub use run::{resolve_credential, run_probe, OutputFormat, RunArgs, PASSWORD_ENV};

#[cfg(feature = "telemetry")]
pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout carries only the report.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub(crate) fn init_tracing(_log_level: &str) {}
