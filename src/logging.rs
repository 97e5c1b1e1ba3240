// 📝 Logging - tracing subscriber setup
//
// RUST_LOG wins over the configured level. Human-readable lines by default,
// one JSON object per line when `json` is set. Logs go to stderr so command
// output on stdout stays clean.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const KNOWN_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let level = level.trim().to_lowercase();
    if !KNOWN_LEVELS.contains(&level.as_str()) {
        return Err(anyhow!(
            "invalid log level '{}', expected one of {}",
            level,
            KNOWN_LEVELS.join(", ")
        ));
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meet_ledger={},warn", level)));

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
