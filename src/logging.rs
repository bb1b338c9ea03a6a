//! Logging setup for hosts embedding linenotes

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the default filter (`info`, or `debug` when verbose)
pub const LOG_ENV: &str = "LINENOTES_LOG";

pub fn env_filter(verbose: bool) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ if verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("info"),
    }
}

/// Install a global fmt subscriber. Returns an error if one is already installed.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(verbose))
        .try_init()?;
    Ok(())
}
