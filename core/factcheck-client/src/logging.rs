//! File logging for the CLI.
//!
//! Stdout carries rendered output and watch events, so logs go to a daily
//! rolling file under ~/.factcheck/logs. `FACTCHECK_DEBUG_LOG=1` raises the
//! level to debug; otherwise `RUST_LOG` is honored with `warn` as default.

use factcheck_core::config;
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "factcheck.log";

/// Installs the global subscriber. The returned guard flushes buffered lines
/// on drop and must live until the process exits. Returns `None` when the
/// log directory is unavailable; the CLI then runs without logging.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = config::default_log_dir().ok()?;
    if let Err(err) = fs_err::create_dir_all(&log_dir) {
        eprintln!("factcheck: logging disabled: {}", err);
        return None;
    }

    let debug_enabled = env::var("FACTCHECK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();

    installed.ok().map(|_| guard)
}
