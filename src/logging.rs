//! Tracing setup for the two ways cardpick runs.
//!
//! A `serve` session gets [`init_session`]: a daily-rotated JSON file
//! under the logs directory plus human-readable stderr. The one-shot
//! subcommands get [`init_cli`]: stderr only. Both honour `RUST_LOG` and
//! fall back to `info`.
//!
//! stdout is off limits in both modes. During `serve` it carries the host
//! wire protocol, and one stray log line there corrupts a command.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the background file writer alive.
///
/// Dropping the guard flushes whatever the non-blocking writer still
/// buffers, so it belongs near the top of `main` and nowhere else.
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Set up logging for one `serve` session.
///
/// Creates `logs_dir` when missing and writes JSON lines to
/// `cardpick.log.YYYY-MM-DD` inside it, rotating daily. A second layer
/// mirrors events to stderr for anyone running the helper by hand.
///
/// # Errors
///
/// Returns an error when the logs directory cannot be created.
pub fn init_session(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let daily = tracing_appender::rolling::daily(logs_dir, "cardpick.log");
    let (file_writer, worker) = tracing_appender::non_blocking(daily);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(LoggingGuard { _worker: worker })
}

/// Stderr-only logging for the one-shot subcommands.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}
