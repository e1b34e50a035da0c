use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::stream::{RelayOutcome, RelayStats};

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(tracing_level(&level)))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log the end of one relay session at INFO level.
pub fn log_session_complete(outcome: RelayOutcome, stats: &RelayStats, duration: Duration) {
    info!(
        outcome = outcome.as_str(),
        tokens = stats.tokens,
        bytes = stats.bytes,
        malformed_lines = stats.malformed,
        duration_seconds = duration.as_secs_f64(),
        "relay session finished"
    );
}
