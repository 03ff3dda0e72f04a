//! Monitor event fan-out to a single optional observer.
//!
//! Observer failures and panics stop here; they never reach the monitor or
//! the IPC caller.

use playwatch_daemon_protocol::MonitorStatus;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEvent {
    Start,
    Pause,
    Stop,
    GameOn,
    GameOff,
}

impl MonitorEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorEvent::Start => "start",
            MonitorEvent::Pause => "pause",
            MonitorEvent::Stop => "stop",
            MonitorEvent::GameOn => "game_on",
            MonitorEvent::GameOff => "game_off",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPayload {
    pub status: MonitorStatus,
    pub elapsed_seconds: u64,
    pub game_detected: bool,
    pub game_title: String,
}

pub trait MonitorObserver: Send + Sync {
    fn on_event(&self, event: MonitorEvent, payload: &EventPayload) -> Result<(), String>;
}

#[derive(Default)]
pub struct Dispatcher {
    observer: Option<Arc<dyn MonitorObserver>>,
}

impl Dispatcher {
    pub fn new(observer: Option<Arc<dyn MonitorObserver>>) -> Self {
        Self { observer }
    }

    pub fn dispatch(&self, event: MonitorEvent, payload: &EventPayload) {
        let Some(observer) = self.observer.as_ref() else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event, payload)));
        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(
                    event = event.as_str(),
                    status = payload.status.as_str(),
                    "Monitor event dispatched"
                );
            }
            Ok(Err(err)) => {
                tracing::warn!(event = event.as_str(), error = %err, "Monitor observer failed");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|value| value.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(event = event.as_str(), panic = %message, "Monitor observer panicked");
            }
        }
    }
}
