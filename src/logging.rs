//! Tracing setup: a daily log file plus stderr.
//!
//! Agent chat is logged under the `bunkbot::chat` target, so
//! `RUST_LOG=bunkbot::chat=info` narrows the output to the conversation.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the rolling log files (`bunkbot.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "bunkbot.log";

/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "info,bunkbot=debug";

fn filter_from_env(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes and stops the file writer.
pub fn init() -> Result<(WorkerGuard, PathBuf)> {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter_from_env(DEFAULT_DIRECTIVES))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();

    tracing::info!(dir = %dir.display(), "Logging to {}.*", LOG_FILE_PREFIX);
    Ok((guard, dir))
}

fn log_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("com", "bunkbot", "bunkbot")
        .map(|dirs| dirs.data_dir().join("logs"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory for logs"))
}

/// Test-writer subscriber. Later calls in the same process are no-ops.
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(filter_from_env("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
