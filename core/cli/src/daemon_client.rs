//! Client helper for talking to the playwatch daemon.
//!
//! One request per connection, newline-delimited JSON both ways. A failed
//! connect is retried once with the same request id. Nothing is retried once
//! the request has been written.

use playwatch_daemon_protocol::{Method, Request, Response, MAX_REQUEST_BYTES};
use rand::RngCore;
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SOCKET_ENV: &str = "PLAYWATCH_SOCKET";
const HOME_ENV: &str = "PLAYWATCH_HOME";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 2000;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Failed to connect to daemon socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid daemon response: {0}")]
    InvalidResponse(String),

    #[error("{code}: {message}")]
    Daemon { code: String, message: String },
}

impl ClientError {
    /// True when the request never reached the daemon.
    fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connect { .. })
    }
}

/// Sends `method` and returns the response `data` (null when absent).
pub fn call(method: Method, params: Option<Value>) -> Result<Value, ClientError> {
    let request_id = make_request_id();
    let response = send_with_retry(|| {
        send_request(Request::new(
            method,
            Some(request_id.clone()),
            params.clone(),
        ))
    })?;

    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }

    let (code, message) = response
        .error
        .map(|err| (err.code, err.message))
        .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
    Err(ClientError::Daemon { code, message })
}

fn send_with_retry<F>(mut send: F) -> Result<Response, ClientError>
where
    F: FnMut() -> Result<Response, ClientError>,
{
    match send() {
        Ok(response) => Ok(response),
        Err(err) if err.is_retryable() => {
            tracing::warn!(error = %err, "Failed to reach daemon; retrying");
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send().map_err(|retry_err| {
                tracing::warn!(error = %retry_err, "Retry failed reaching daemon");
                retry_err
            })
        }
        Err(err) => Err(err),
    }
}

pub fn socket_path() -> Result<PathBuf, ClientError> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    if let Ok(home) = env::var(HOME_ENV) {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home).join(SOCKET_NAME));
        }
    }
    let home = dirs::home_dir().ok_or(ClientError::HomeNotFound)?;
    Ok(home.join(".playwatch").join(SOCKET_NAME))
}

fn send_request(request: Request) -> Result<Response, ClientError> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket).map_err(|source| ClientError::Connect {
        path: socket.clone(),
        source,
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    tracing::debug!(method = ?request.method, id = ?request.id, "Sending daemon request");
    let mut payload = serde_json::to_vec(&request).map_err(|err| ClientError::Io {
        context: "Failed to encode request".to_string(),
        source: err.into(),
    })?;
    payload.push(b'\n');
    stream.write_all(&payload).map_err(|source| ClientError::Io {
        context: "Failed to write request".to_string(),
        source,
    })?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, ClientError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::InvalidResponse(
                        "Response exceeded maximum size".to_string(),
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(source) => {
                return Err(ClientError::Io {
                    context: "Failed to read response".to_string(),
                    source,
                })
            }
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::InvalidResponse(
            "Daemon response was empty".to_string(),
        ));
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| ClientError::InvalidResponse(format!("Failed to parse response JSON: {}", err)))
}

fn make_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis())
        .unwrap_or(0);
    let random = rand::thread_rng().next_u64();
    format!("cli-{}-{}-{:x}", millis, std::process::id(), random)
}
