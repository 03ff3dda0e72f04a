//! SQLite persistence for playwatch-daemon.
//!
//! This is the single-writer store backing the daemon: per-user play totals,
//! an append-only game history, alert settings and an append-only alert log.

use chrono::Utc;
use playwatch_daemon_protocol::{AlertChannel, AlertLogEntry, AlertSettings};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;

use crate::error::{IoContext, Result, StorageContext};
use crate::store::{GameHistoryEntry, MonitorStore, UserMonitorStats};

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS user_monitor_stats (
                    user_id INTEGER PRIMARY KEY,
                    total_play_seconds INTEGER NOT NULL DEFAULT 0,
                    total_sessions INTEGER NOT NULL DEFAULT 0,
                    last_session_seconds INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS game_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    game_name TEXT NOT NULL,
                    play_seconds INTEGER NOT NULL,
                    played_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_game_history_user
                    ON game_history (user_id, played_at);
                 CREATE TABLE IF NOT EXISTS user_alert_settings (
                    user_id INTEGER PRIMARY KEY,
                    phone_number TEXT NOT NULL DEFAULT '',
                    email_enabled INTEGER NOT NULL DEFAULT 1,
                    sms_enabled INTEGER NOT NULL DEFAULT 0,
                    alert_on_detect INTEGER NOT NULL DEFAULT 1,
                    threshold_minutes INTEGER NOT NULL DEFAULT 30,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS alerts_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    alert_type TEXT NOT NULL,
                    message TEXT NOT NULL,
                    game_name TEXT,
                    channel TEXT NOT NULL,
                    sent_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_alerts_log_user
                    ON alerts_log (user_id, sent_at);
                 COMMIT;",
            )
            .storage_context("Failed to initialize schema")
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent).io_context("Failed to create daemon data dir")?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .storage_context("Failed to open sqlite db")?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .storage_context("Failed to enable WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .storage_context("Failed to set synchronous")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .storage_context("Failed to set busy_timeout")?;

        Ok(conn)
    }
}

impl MonitorStore for Db {
    fn finalize_session(
        &self,
        user_id: i64,
        elapsed_seconds: u64,
        game_name: Option<&str>,
    ) -> Result<()> {
        let seconds = to_sql_seconds(elapsed_seconds);
        let now = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .storage_context("Failed to begin finalize transaction")?;

            tx.execute(
                "INSERT INTO user_monitor_stats \
                    (user_id, total_play_seconds, total_sessions, last_session_seconds, updated_at) \
                 VALUES (?1, ?2, 1, ?2, ?3) \
                 ON CONFLICT(user_id) DO UPDATE SET \
                    total_play_seconds = user_monitor_stats.total_play_seconds + excluded.total_play_seconds, \
                    total_sessions = user_monitor_stats.total_sessions + 1, \
                    last_session_seconds = excluded.last_session_seconds, \
                    updated_at = excluded.updated_at",
                params![user_id, seconds, now],
            )
            .storage_context("Failed to upsert monitor stats")?;

            if let Some(game_name) = game_name.filter(|name| !name.trim().is_empty()) {
                tx.execute(
                    "INSERT INTO game_history (user_id, game_name, play_seconds, played_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, game_name, seconds, now],
                )
                .storage_context("Failed to insert game history")?;
            }

            tx.commit()
                .storage_context("Failed to commit finalize transaction")
        })
    }

    fn user_stats(&self, user_id: i64) -> Result<UserMonitorStats> {
        self.with_connection(|conn| {
            let stats = conn
                .query_row(
                    "SELECT total_play_seconds, total_sessions, last_session_seconds \
                     FROM user_monitor_stats WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(UserMonitorStats {
                            user_id,
                            total_play_seconds: from_sql_seconds(row.get(0)?),
                            total_sessions: from_sql_seconds(row.get(1)?),
                            last_session_seconds: from_sql_seconds(row.get(2)?),
                        })
                    },
                )
                .optional()
                .storage_context("Failed to query monitor stats")?;

            Ok(stats.unwrap_or(UserMonitorStats {
                user_id,
                ..UserMonitorStats::default()
            }))
        })
    }

    fn game_history(&self, user_id: i64, limit: usize) -> Result<Vec<GameHistoryEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT game_name, play_seconds, played_at FROM game_history \
                     WHERE user_id = ?1 ORDER BY played_at DESC, id DESC LIMIT ?2",
                )
                .storage_context("Failed to prepare game history query")?;

            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| {
                    Ok(GameHistoryEntry {
                        user_id,
                        game_name: row.get(0)?,
                        play_seconds: from_sql_seconds(row.get(1)?),
                        played_at: row.get(2)?,
                    })
                })
                .storage_context("Failed to read game history rows")?;

            let entries = rows
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage_context("Failed to decode game history row")?;
            Ok(entries)
        })
    }

    fn alert_settings(&self, user_id: i64) -> Result<Option<AlertSettings>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT phone_number, email_enabled, sms_enabled, alert_on_detect, threshold_minutes \
                 FROM user_alert_settings WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(AlertSettings {
                        phone_number: row.get(0)?,
                        email_enabled: row.get(1)?,
                        sms_enabled: row.get(2)?,
                        alert_on_detect: row.get(3)?,
                        threshold_minutes: row.get::<_, i64>(4)?.clamp(0, u32::MAX as i64) as u32,
                    })
                },
            )
            .optional()
            .storage_context("Failed to query alert settings")
        })
    }

    fn save_alert_settings(&self, user_id: i64, settings: &AlertSettings) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO user_alert_settings \
                    (user_id, phone_number, email_enabled, sms_enabled, alert_on_detect, \
                     threshold_minutes, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(user_id) DO UPDATE SET \
                    phone_number = excluded.phone_number, \
                    email_enabled = excluded.email_enabled, \
                    sms_enabled = excluded.sms_enabled, \
                    alert_on_detect = excluded.alert_on_detect, \
                    threshold_minutes = excluded.threshold_minutes, \
                    updated_at = excluded.updated_at",
                params![
                    user_id,
                    settings.phone_number.trim(),
                    settings.email_enabled,
                    settings.sms_enabled,
                    settings.alert_on_detect,
                    settings.threshold_minutes as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .storage_context("Failed to upsert alert settings")?;
            Ok(())
        })
    }

    fn append_alert_log(&self, entry: &AlertLogEntry) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO alerts_log (user_id, alert_type, message, game_name, channel, sent_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.user_id,
                    entry.alert_type,
                    entry.message,
                    entry.game_name,
                    entry.channel.as_str(),
                    entry.sent_at
                ],
            )
            .storage_context("Failed to insert alert log entry")?;
            Ok(())
        })
    }

    fn alert_log(&self, user_id: i64, limit: usize) -> Result<Vec<AlertLogEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT alert_type, message, game_name, channel, sent_at FROM alerts_log \
                     WHERE user_id = ?1 ORDER BY sent_at DESC, id DESC LIMIT ?2",
                )
                .storage_context("Failed to prepare alert log query")?;

            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| {
                    let channel: String = row.get(3)?;
                    Ok(AlertLogEntry {
                        user_id,
                        alert_type: row.get(0)?,
                        message: row.get(1)?,
                        game_name: row.get(2)?,
                        channel: AlertChannel::parse(&channel).unwrap_or(AlertChannel::System),
                        sent_at: row.get(4)?,
                    })
                })
                .storage_context("Failed to read alert log rows")?;

            let entries = rows
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage_context("Failed to decode alert log row")?;
            Ok(entries)
        })
    }
}

fn to_sql_seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_seconds(value: i64) -> u64 {
    value.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, Db) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("daemon").join("state.db")).expect("db init");
        (temp_dir, db)
    }

    fn log_entry(user_id: i64, alert_type: &str, sent_at: &str) -> AlertLogEntry {
        AlertLogEntry {
            user_id,
            alert_type: alert_type.to_string(),
            message: format!("{} message", alert_type),
            game_name: None,
            channel: AlertChannel::Email,
            sent_at: sent_at.to_string(),
        }
    }

    #[test]
    fn user_stats_default_to_zero() {
        let (_dir, db) = temp_db();
        let stats = db.user_stats(7).expect("stats");
        assert_eq!(stats.user_id, 7);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_play_seconds, 0);
        assert_eq!(stats.last_session_seconds, 0);
    }

    #[test]
    fn finalize_session_accumulates_stats() {
        let (_dir, db) = temp_db();
        db.finalize_session(1, 120, Some("steam.exe"))
            .expect("first session");
        db.finalize_session(1, 30, None).expect("second session");

        let stats = db.user_stats(1).expect("stats");
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_play_seconds, 150);
        assert_eq!(stats.last_session_seconds, 30);

        let history = db.game_history(1, 20).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].game_name, "steam.exe");
        assert_eq!(history[0].play_seconds, 120);
    }

    #[test]
    fn finalize_session_counts_sub_second_sessions() {
        let (_dir, db) = temp_db();
        db.finalize_session(1, 0, Some("steam.exe"))
            .expect("short session");

        let stats = db.user_stats(1).expect("stats");
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_play_seconds, 0);
        let history = db.game_history(1, 20).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].play_seconds, 0);
    }

    #[test]
    fn game_history_is_newest_first_and_limited() {
        let (_dir, db) = temp_db();
        for (index, game) in ["dota2.exe", "cs2.exe", "roblox.exe"].iter().enumerate() {
            db.finalize_session(4, 10 + index as u64, Some(game))
                .expect("finalize");
        }

        let history = db.game_history(4, 2).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].game_name, "roblox.exe");
        assert_eq!(history[1].game_name, "cs2.exe");

        assert!(db.game_history(5, 20).expect("other user").is_empty());
    }

    #[test]
    fn alert_settings_round_trip_and_overwrite() {
        let (_dir, db) = temp_db();
        assert_eq!(db.alert_settings(2).expect("missing"), None);

        let mut settings = AlertSettings {
            phone_number: " +15550100 ".to_string(),
            sms_enabled: true,
            ..AlertSettings::default()
        };
        db.save_alert_settings(2, &settings).expect("save");

        settings.email_enabled = false;
        settings.threshold_minutes = 0;
        db.save_alert_settings(2, &settings).expect("overwrite");

        let stored = db.alert_settings(2).expect("load").expect("present");
        assert_eq!(stored.phone_number, "+15550100");
        assert!(!stored.email_enabled);
        assert!(stored.sms_enabled);
        assert_eq!(stored.threshold_minutes, 0);
    }

    #[test]
    fn alert_log_is_newest_first() {
        let (_dir, db) = temp_db();
        db.append_alert_log(&log_entry(3, "game_detected", "2026-01-30T00:00:00+00:00"))
            .expect("append 1");
        db.append_alert_log(&log_entry(3, "test", "2026-01-30T00:05:00+00:00"))
            .expect("append 2");
        let mut sms = log_entry(3, "test", "2026-01-30T00:05:00+00:00");
        sms.channel = AlertChannel::Sms;
        sms.game_name = Some("gta5.exe".to_string());
        db.append_alert_log(&sms).expect("append 3");

        let entries = db.alert_log(3, 20).expect("alert log");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].channel, AlertChannel::Sms);
        assert_eq!(entries[0].game_name.as_deref(), Some("gta5.exe"));
        assert_eq!(entries[1].alert_type, "test");
        assert_eq!(entries[2].alert_type, "game_detected");

        assert_eq!(db.alert_log(3, 1).expect("limited").len(), 1);
    }

    #[test]
    fn reopening_keeps_existing_rows() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.db");
        Db::new(path.clone())
            .expect("db init")
            .finalize_session(9, 60, None)
            .expect("finalize");

        let reopened = Db::new(path).expect("db reopen");
        assert_eq!(reopened.user_stats(9).expect("stats").total_play_seconds, 60);
    }
}
