//! Alert decisions and delivery.
//!
//! Every alert is appended to the alert log before any transport is tried, so
//! the log records intent even when delivery fails.

use chrono::{Local, Utc};
use playwatch_daemon_protocol::{
    format_elapsed, AlertChannel, AlertLogEntry, AlertSettings, MailStatus,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::mail::{mask_email, MailMessage, MailTransport};
use crate::store::MonitorStore;

pub const ALERT_GAME_DETECTED: &str = "game_detected";
pub const ALERT_THRESHOLD_EXCEEDED: &str = "threshold_exceeded";
pub const ALERT_TEST: &str = "test";

pub struct AlertTrigger {
    store: Arc<dyn MonitorStore>,
    mail: Arc<dyn MailTransport>,
    subject_prefix: String,
}

impl AlertTrigger {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        mail: Arc<dyn MailTransport>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mail,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Stored settings for the user, or defaults when absent or unreadable.
    pub fn settings_for(&self, user_id: i64) -> AlertSettings {
        match self.store.alert_settings(user_id) {
            Ok(Some(settings)) => settings,
            Ok(None) => AlertSettings::default(),
            Err(err) => {
                warn!(user_id, error = %err, "Failed to load alert settings; using defaults");
                AlertSettings::default()
            }
        }
    }

    pub fn trigger_game_alert(&self, user_id: Option<i64>, game_name: &str) -> Vec<AlertChannel> {
        let Some(user_id) = user_id else {
            return Vec::new();
        };
        let settings = self.settings_for(user_id);
        if !settings.alert_on_detect {
            debug!(user_id, "Game alert suppressed by settings");
            return Vec::new();
        }

        let message = format!(
            "Game detected: {} at {}",
            game_name,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.send_to_enabled(
            user_id,
            &settings,
            ALERT_GAME_DETECTED,
            &message,
            Some(game_name),
        )
    }

    /// Fires the play-time alert. The caller decides when the threshold has
    /// been crossed; this only formats and delivers.
    pub fn trigger_threshold_alert(
        &self,
        user_id: i64,
        threshold_minutes: u32,
        elapsed_seconds: u64,
        game_name: Option<&str>,
    ) -> Vec<AlertChannel> {
        let settings = self.settings_for(user_id);
        let message = format!(
            "Play time threshold of {} minutes reached ({})",
            threshold_minutes,
            format_elapsed(elapsed_seconds)
        );
        self.send_to_enabled(
            user_id,
            &settings,
            ALERT_THRESHOLD_EXCEEDED,
            &message,
            game_name,
        )
    }

    pub fn test_alert(&self, user_id: i64, user_name: &str) -> Vec<AlertChannel> {
        let settings = self.settings_for(user_id);
        let message = format!("Test alert from PlayWatch. User: {}", user_name);
        let channels = self.send_to_enabled(user_id, &settings, ALERT_TEST, &message, None);
        if !channels.is_empty() {
            return channels;
        }
        self.send_alert(user_id, ALERT_TEST, &message, None, AlertChannel::System);
        vec![AlertChannel::System]
    }

    /// Logs the alert, then delivers it over `channel`. Returns whether the
    /// log entry was written; transport failures only show up in the log.
    pub fn send_alert(
        &self,
        user_id: i64,
        alert_type: &str,
        message: &str,
        game_name: Option<&str>,
        channel: AlertChannel,
    ) -> bool {
        let entry = AlertLogEntry {
            user_id,
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            game_name: game_name.map(str::to_string),
            channel,
            sent_at: Utc::now().to_rfc3339(),
        };

        let logged = match self.store.append_alert_log(&entry) {
            Ok(()) => true,
            Err(err) => {
                warn!(user_id, alert_type, error = %err, "Failed to append alert log entry");
                false
            }
        };

        match channel {
            AlertChannel::Email => {
                let mail = MailMessage {
                    subject: format!("{}: {}", self.subject_prefix, alert_type),
                    body: message.to_string(),
                    user_id,
                };
                if let Err(err) = self.mail.send(&mail) {
                    let err = DaemonError::Mail(err);
                    warn!(user_id, alert_type, error = %err, "Alert email was not delivered");
                }
            }
            AlertChannel::Sms => {
                info!(user_id, alert_type, alert_message = message, "Alert SMS sent (simulated)");
            }
            AlertChannel::System => {
                info!(user_id, alert_type, alert_message = message, "System alert recorded");
            }
        }

        logged
    }

    pub fn mail_status(&self) -> MailStatus {
        MailStatus {
            configured: self.mail.is_configured(),
            sender: self.mail.sender().map(mask_email),
        }
    }

    fn send_to_enabled(
        &self,
        user_id: i64,
        settings: &AlertSettings,
        alert_type: &str,
        message: &str,
        game_name: Option<&str>,
    ) -> Vec<AlertChannel> {
        let channels = enabled_channels(settings);
        for channel in &channels {
            self.send_alert(user_id, alert_type, message, game_name, *channel);
        }
        channels
    }
}

fn enabled_channels(settings: &AlertSettings) -> Vec<AlertChannel> {
    let mut channels = Vec::new();
    if settings.email_enabled {
        channels.push(AlertChannel::Email);
    }
    if settings.sms_enabled && settings.has_phone() {
        channels.push(AlertChannel::Sms);
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::mail::testing::RecordingMail;
    use crate::mail::LogMailTransport;
    use crate::store::testing::FailingStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Arc<Db>,
        mail: Arc<RecordingMail>,
        trigger: AlertTrigger,
    }

    fn fixture_with(mail: RecordingMail) -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Arc::new(Db::new(dir.path().join("state.db")).expect("db init"));
        let mail = Arc::new(mail);
        let trigger = AlertTrigger::new(db.clone(), mail.clone(), "PlayWatch Alert");
        Fixture {
            _dir: dir,
            db,
            mail,
            trigger,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingMail::new())
    }

    fn save(fixture: &Fixture, user_id: i64, settings: AlertSettings) {
        fixture
            .db
            .save_alert_settings(user_id, &settings)
            .expect("save settings");
    }

    #[test]
    fn game_alert_uses_default_email_channel() {
        let fixture = fixture();
        let channels = fixture.trigger.trigger_game_alert(Some(1), "steam.exe");
        assert_eq!(channels, vec![AlertChannel::Email]);

        let log = fixture.db.alert_log(1, 20).expect("alert log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].alert_type, ALERT_GAME_DETECTED);
        assert_eq!(log[0].game_name.as_deref(), Some("steam.exe"));
        assert!(log[0].message.starts_with("Game detected: steam.exe at "));

        let sent = fixture.mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "PlayWatch Alert: game_detected");
    }

    #[test]
    fn game_alert_without_user_is_noop() {
        let fixture = fixture();
        assert!(fixture.trigger.trigger_game_alert(None, "steam.exe").is_empty());
        assert!(fixture.mail.sent().is_empty());
    }

    #[test]
    fn game_alert_respects_alert_on_detect() {
        let fixture = fixture();
        save(
            &fixture,
            1,
            AlertSettings {
                alert_on_detect: false,
                ..AlertSettings::default()
            },
        );
        assert!(fixture.trigger.trigger_game_alert(Some(1), "dota2.exe").is_empty());
        assert!(fixture.db.alert_log(1, 20).expect("log").is_empty());
    }

    #[test]
    fn sms_requires_phone_number() {
        let fixture = fixture();
        save(
            &fixture,
            2,
            AlertSettings {
                email_enabled: false,
                sms_enabled: true,
                ..AlertSettings::default()
            },
        );
        assert!(fixture.trigger.trigger_game_alert(Some(2), "cs2.exe").is_empty());

        save(
            &fixture,
            2,
            AlertSettings {
                email_enabled: true,
                sms_enabled: true,
                phone_number: "+15550100".to_string(),
                ..AlertSettings::default()
            },
        );
        let channels = fixture.trigger.trigger_game_alert(Some(2), "cs2.exe");
        assert_eq!(channels, vec![AlertChannel::Email, AlertChannel::Sms]);
        assert_eq!(fixture.db.alert_log(2, 20).expect("log").len(), 2);
    }

    #[test]
    fn test_alert_with_no_channels_logs_single_system_entry() {
        let fixture = fixture();
        save(
            &fixture,
            3,
            AlertSettings {
                email_enabled: false,
                sms_enabled: false,
                ..AlertSettings::default()
            },
        );

        let channels = fixture.trigger.test_alert(3, "Avery");
        assert_eq!(channels, vec![AlertChannel::System]);

        let log = fixture.db.alert_log(3, 20).expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].channel, AlertChannel::System);
        assert_eq!(log[0].alert_type, ALERT_TEST);
        assert_eq!(log[0].message, "Test alert from PlayWatch. User: Avery");
        assert!(fixture.mail.sent().is_empty());
    }

    #[test]
    fn test_alert_ignores_alert_on_detect() {
        let fixture = fixture();
        save(
            &fixture,
            3,
            AlertSettings {
                alert_on_detect: false,
                ..AlertSettings::default()
            },
        );
        assert_eq!(fixture.trigger.test_alert(3, "Avery"), vec![AlertChannel::Email]);
    }

    #[test]
    fn mail_failure_keeps_log_entry() {
        let fixture = fixture_with(RecordingMail::failing());
        assert!(fixture.trigger.send_alert(
            4,
            ALERT_TEST,
            "hello",
            None,
            AlertChannel::Email
        ));
        assert_eq!(fixture.db.alert_log(4, 20).expect("log").len(), 1);
    }

    #[test]
    fn unconfigured_mail_still_logs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Arc::new(Db::new(dir.path().join("state.db")).expect("db init"));
        let trigger = AlertTrigger::new(
            db.clone(),
            Arc::new(LogMailTransport::new(None)),
            "PlayWatch Alert",
        );
        trigger.trigger_game_alert(Some(5), "fortnite.exe");
        assert_eq!(db.alert_log(5, 20).expect("log").len(), 1);
        assert!(!trigger.mail_status().configured);
    }

    #[test]
    fn store_failure_falls_back_to_defaults_and_still_sends() {
        let mail = Arc::new(RecordingMail::new());
        let trigger = AlertTrigger::new(Arc::new(FailingStore), mail.clone(), "PlayWatch Alert");

        assert!(trigger.settings_for(1).email_enabled);
        let channels = trigger.trigger_game_alert(Some(1), "roblox.exe");
        assert_eq!(channels, vec![AlertChannel::Email]);
        assert!(!trigger.send_alert(1, ALERT_TEST, "hi", None, AlertChannel::Sms));
        assert_eq!(mail.sent().len(), 1);
    }

    #[test]
    fn threshold_alert_formats_elapsed() {
        let fixture = fixture();
        let channels = fixture
            .trigger
            .trigger_threshold_alert(6, 30, 1805, Some("gta5.exe"));
        assert_eq!(channels, vec![AlertChannel::Email]);

        let log = fixture.db.alert_log(6, 20).expect("log");
        assert_eq!(log[0].alert_type, ALERT_THRESHOLD_EXCEEDED);
        assert_eq!(
            log[0].message,
            "Play time threshold of 30 minutes reached (00:30:05)"
        );
    }

    #[test]
    fn mail_status_masks_sender() {
        let fixture = fixture();
        let status = fixture.trigger.mail_status();
        assert!(status.configured);
        assert_eq!(status.sender.as_deref(), Some("al***@example.com"));
    }
}
