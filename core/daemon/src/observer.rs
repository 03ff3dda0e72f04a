//! Indicator file written for the desktop shell.
//!
//! The shell polls `indicator.json` to render the floating status widget. It
//! becomes visible on `start` and hides again on `stop`.

use chrono::Utc;
use fs_err as fs;
use playwatch_daemon_protocol::{format_elapsed, MonitorStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::dispatch::{EventPayload, MonitorEvent, MonitorObserver};

#[derive(Debug, Serialize)]
struct IndicatorRecord<'a> {
    event: MonitorEvent,
    status: MonitorStatus,
    elapsed_seconds: u64,
    elapsed_display: String,
    game_detected: bool,
    game_title: &'a str,
    updated_at: String,
    visible: bool,
}

pub struct IndicatorFileObserver {
    path: PathBuf,
    /// Current visibility. Held across the whole write so concurrent events
    /// never share the tmp file.
    visible: Mutex<bool>,
}

impl IndicatorFileObserver {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            visible: Mutex::new(false),
        }
    }
}

impl MonitorObserver for IndicatorFileObserver {
    fn on_event(&self, event: MonitorEvent, payload: &EventPayload) -> Result<(), String> {
        let mut visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            MonitorEvent::Start => *visible = true,
            MonitorEvent::Stop => *visible = false,
            _ => {}
        }

        let record = IndicatorRecord {
            event,
            status: payload.status,
            elapsed_seconds: payload.elapsed_seconds,
            elapsed_display: format_elapsed(payload.elapsed_seconds),
            game_detected: payload.game_detected,
            game_title: &payload.game_title,
            updated_at: Utc::now().to_rfc3339(),
            visible: *visible,
        };
        write_atomic(&self.path, &record)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create indicator dir: {}", err))?;
    }

    let payload = serde_json::to_vec_pretty(value)
        .map_err(|err| format!("Failed to serialize indicator: {}", err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| format!("Failed to write indicator: {}", err))?;
    fs::rename(&tmp_path, path).map_err(|err| format!("Failed to commit indicator: {}", err))?;
    Ok(())
}
