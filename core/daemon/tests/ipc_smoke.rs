use playwatch_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn data_dir(home: &Path) -> PathBuf {
    home.join(".playwatch")
}

fn write_config(home: &Path) {
    let dir = data_dir(home);
    std::fs::create_dir_all(&dir).expect("create data dir");
    // No real process matches, so detection stays quiet during the test.
    std::fs::write(
        dir.join("config.toml"),
        "poll_interval_secs = 1\ngame_keywords = [\"zzz-no-such-game\"]\n",
    )
    .expect("write config");
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_playwatch-daemon"))
        .env("HOME", home)
        .env_remove("PLAYWATCH_HOME")
        .env_remove("PLAYWATCH_MAIL_SENDER")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn playwatch-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    data_dir(home).join("daemon.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, method: Method, params: Option<Value>) -> Response {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some("smoke".to_string()),
        params,
    };
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn ok_data(response: Response) -> Value {
    assert!(response.ok, "response was not ok: {:?}", response.error);
    response.data.expect("response data")
}

#[test]
fn daemon_ipc_monitor_lifecycle_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    write_config(home.path());
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(5));

    let health = ok_data(send_request(&socket, Method::GetHealth, None));
    assert_eq!(health["status"], "ok");
    assert_eq!(health["poll_interval_secs"], 1);

    let started = ok_data(send_request(
        &socket,
        Method::MonitorStart,
        Some(json!({"user_id": 42})),
    ));
    assert_eq!(started["status"], "running");
    assert_eq!(started["game_detected"], false);

    sleep(Duration::from_millis(1200));

    let status = ok_data(send_request(&socket, Method::MonitorStatus, None));
    assert_eq!(status["status"], "running");
    assert!(status["elapsed_seconds"].as_u64().unwrap_or(0) >= 1);

    let stopped = ok_data(send_request(
        &socket,
        Method::MonitorStop,
        Some(json!({"user_id": 42})),
    ));
    assert_eq!(stopped["status"], "stopped");
    assert_eq!(stopped["elapsed_display"], "00:00:00");
    assert_eq!(stopped["total_sessions"], 1);

    let indicator = std::fs::read_to_string(data_dir(home.path()).join("indicator.json"))
        .expect("indicator file written");
    let indicator: Value = serde_json::from_str(&indicator).expect("indicator JSON");
    assert_eq!(indicator["event"], "stop");
    assert_eq!(indicator["visible"], false);
}

#[test]
fn daemon_ipc_alerts_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    write_config(home.path());
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(5));

    let saved = ok_data(send_request(
        &socket,
        Method::SaveAlertSettings,
        Some(json!({
            "user_id": 7,
            "settings": {"email_enabled": false, "sms_enabled": false}
        })),
    ));
    assert_eq!(saved["saved"], true);

    let result = ok_data(send_request(
        &socket,
        Method::TestAlert,
        Some(json!({"user_id": 7, "user_name": "Sam"})),
    ));
    assert_eq!(result["channels"], json!(["system"]));

    let log = ok_data(send_request(
        &socket,
        Method::GetAlertLog,
        Some(json!({"user_id": 7})),
    ));
    let entries = log.as_array().expect("alert log array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["channel"], "system");
    assert_eq!(entries[0]["alert_type"], "test");

    let mail = ok_data(send_request(&socket, Method::GetMailStatus, None));
    assert_eq!(mail["configured"], false);
}
