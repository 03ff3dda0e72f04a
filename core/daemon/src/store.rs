//! Persistence gateway used by the monitor and alert trigger.

use playwatch_daemon_protocol::{AlertLogEntry, AlertSettings};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserMonitorStats {
    pub user_id: i64,
    pub total_play_seconds: u64,
    pub total_sessions: u64,
    pub last_session_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameHistoryEntry {
    pub user_id: i64,
    pub game_name: String,
    pub play_seconds: u64,
    pub played_at: String,
}

pub trait MonitorStore: Send + Sync {
    /// Adds a completed session to the user's totals and, when a game was
    /// seen, appends a history row. Both writes commit together. Callers only
    /// finalize sessions with positive elapsed time; `elapsed_seconds` is
    /// already truncated and may be zero.
    fn finalize_session(
        &self,
        user_id: i64,
        elapsed_seconds: u64,
        game_name: Option<&str>,
    ) -> Result<()>;

    /// Totals for the user; zeroed stats when the user has none yet.
    fn user_stats(&self, user_id: i64) -> Result<UserMonitorStats>;

    /// Newest first.
    fn game_history(&self, user_id: i64, limit: usize) -> Result<Vec<GameHistoryEntry>>;

    fn alert_settings(&self, user_id: i64) -> Result<Option<AlertSettings>>;

    fn save_alert_settings(&self, user_id: i64, settings: &AlertSettings) -> Result<()>;

    fn append_alert_log(&self, entry: &AlertLogEntry) -> Result<()>;

    /// Newest first.
    fn alert_log(&self, user_id: i64, limit: usize) -> Result<Vec<AlertLogEntry>>;
}
