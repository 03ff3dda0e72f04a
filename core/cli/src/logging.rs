//! File logging for the CLI.
//!
//! Stdout carries JSON output, so diagnostics go to a daily-rolling file under
//! `~/.playwatch/logs`. Logging is best effort: if the directory cannot be
//! created the CLI runs without a subscriber.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_NAME: &str = "playwatch.log";

pub fn init() -> Option<WorkerGuard> {
    let log_dir = log_dir()?;
    fs_err::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .try_init()
        .is_ok();

    installed.then_some(guard)
}

fn debug_enabled() -> bool {
    env::var("PLAYWATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn log_dir() -> Option<PathBuf> {
    if let Ok(value) = env::var("PLAYWATCH_HOME") {
        if !value.trim().is_empty() {
            return Some(PathBuf::from(value).join("logs"));
        }
    }
    dirs::home_dir().map(|home| home.join(".playwatch").join("logs"))
}
