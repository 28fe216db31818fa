//! Logging initialization using the `tracing` ecosystem.
//!
//! Output is one JSON object per line. Stdout carries INFO and above; the
//! optional file output (daily rotation via `tracing-appender`) receives
//! every level that passes the env filter.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the global tracing subscriber.
///
/// Called exactly once at program start; every `tracing::info!()` etc. after
/// this produces output.
///
/// # Parameters
///
/// - `log_level`: default level if the `RUST_LOG` env var is not set
/// - `log_dir`: optional directory for daily-rotating JSON log files
/// - `file_prefix`: log file name prefix (e.g. `"talonbot"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, file_prefix: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_filter(LevelFilter::INFO);

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .init();
    }
}
