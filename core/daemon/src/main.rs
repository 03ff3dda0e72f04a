//! PlayWatch daemon entrypoint.
//!
//! A small, single-writer service: a socket listener with strict request
//! validation, a background game-detection thread and a SQLite store for
//! per-user play statistics and alerts.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use playwatch_daemon_protocol::{ErrorInfo, Request, Response, MAX_REQUEST_BYTES};

mod alerts;
mod api;
mod clock;
mod config;
mod db;
mod detector;
mod dispatch;
mod error;
mod mail;
mod monitor;
mod observer;
mod store;

use alerts::AlertTrigger;
use api::Services;
use clock::SystemClock;
use config::DaemonConfig;
use db::Db;
use detector::{GameDetector, SysinfoProcessLister};
use dispatch::MonitorObserver;
use error::{IoContext, Result};
use mail::LogMailTransport;
use monitor::Monitor;
use observer::IndicatorFileObserver;
use store::MonitorStore;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let socket_path = match config::socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "PlayWatch daemon started");

    let config = load_config();

    let db_path = match config::db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    let services = Arc::new(build_services(db, &config));
    info!(
        poll_interval_secs = config.poll_interval_secs,
        keywords = config.game_keywords.len(),
        mail_configured = config.mail.sender.is_some(),
        "Monitor runtime config loaded"
    );

    let detector = GameDetector::new(
        Arc::new(SysinfoProcessLister::new()),
        config.game_keywords.clone(),
    );
    monitor::spawn_detection_loop(
        Arc::clone(&services.monitor),
        detector,
        Duration::from_secs(config.poll_interval_secs),
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let services = Arc::clone(&services);
                thread::spawn(move || handle_connection(stream, &services));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("PLAYWATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> DaemonConfig {
    let path = match config::config_path() {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %err, "Failed to resolve config path; using defaults");
            return config::fallback_config();
        }
    };
    match config::load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using safe defaults");
            config::fallback_config()
        }
    }
}

fn build_services(db: Db, config: &DaemonConfig) -> Services {
    let store: Arc<dyn MonitorStore> = Arc::new(db);
    let alerts = Arc::new(AlertTrigger::new(
        Arc::clone(&store),
        Arc::new(LogMailTransport::from_config(&config.mail)),
        config.mail.subject_prefix.clone(),
    ));

    let observer: Option<Arc<dyn MonitorObserver>> = match config::indicator_path() {
        Ok(path) => Some(Arc::new(IndicatorFileObserver::new(path))),
        Err(err) => {
            warn!(error = %err, "Indicator path unavailable; running without observer");
            None
        }
    };

    let monitor = Arc::new(Monitor::new(
        Arc::new(SystemClock),
        Arc::clone(&store),
        Arc::clone(&alerts),
        observer,
    ));

    Services {
        monitor,
        store,
        alerts,
        history_limit: config.history_limit,
        poll_interval_secs: config.poll_interval_secs,
    }
}

fn prepare_socket_dir(socket_path: &Path) -> Result<()> {
    let Some(parent) = socket_path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).io_context("Failed to create socket directory")
}

fn remove_existing_socket(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        fs::remove_file(socket_path).io_context("Failed to remove existing socket")?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, services: &Services) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = api::handle_request(request, services);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> std::result::Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
