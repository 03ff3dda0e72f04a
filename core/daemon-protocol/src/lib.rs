//! IPC protocol types and validation for playwatch-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests and decode responses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    MonitorStart,
    MonitorPause,
    MonitorStop,
    MonitorStatus,
    GameHistory,
    GetAlertSettings,
    SaveAlertSettings,
    GetAlertLog,
    TestAlert,
    GetMailStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, id: Option<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitor views
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Stopped => "stopped",
            MonitorStatus::Running => "running",
            MonitorStatus::Paused => "paused",
        }
    }
}

/// Live monitor state as returned by start/pause/stop/status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorView {
    pub status: MonitorStatus,
    pub elapsed_seconds: u64,
    pub elapsed_display: String,
    pub game_detected: bool,
    pub game_title: String,
}

/// Monitor view plus the caller's lifetime totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    #[serde(flatten)]
    pub monitor: MonitorView,
    pub total_sessions: u64,
    pub total_play_time_display: String,
    /// Whole seconds of the user's most recently finalized session.
    pub last_session_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHistoryView {
    pub game_name: String,
    pub play_seconds: u64,
    pub play_time: String,
    pub played_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub phone_number: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub alert_on_detect: bool,
    pub threshold_minutes: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            phone_number: String::new(),
            email_enabled: true,
            sms_enabled: false,
            alert_on_detect: true,
            threshold_minutes: 30,
        }
    }
}

impl AlertSettings {
    pub fn has_phone(&self) -> bool {
        !self.phone_number.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Email,
    Sms,
    System,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Email => "email",
            AlertChannel::Sms => "sms",
            AlertChannel::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(AlertChannel::Email),
            "sms" => Some(AlertChannel::Sms),
            "system" => Some(AlertChannel::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub user_id: i64,
    pub alert_type: String,
    pub message: String,
    #[serde(default)]
    pub game_name: Option<String>,
    pub channel: AlertChannel,
    pub sent_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAlertResult {
    pub sent: bool,
    pub channels: Vec<AlertChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailStatus {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request params
// ─────────────────────────────────────────────────────────────────────────────

/// Params for start/stop/status. The user is optional: an anonymous session
/// still accumulates time but is never finalized.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorParams {
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserQueryParams {
    pub user_id: i64,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl UserQueryParams {
    /// Requested limit clamped to `1..=MAX_LIST_LIMIT`, or `default` when absent.
    pub fn effective_limit(&self, default: usize) -> usize {
        self.limit
            .map(|value| value as usize)
            .unwrap_or(default)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveAlertSettingsParams {
    pub user_id: i64,
    pub settings: AlertSettings,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestAlertParams {
    pub user_id: i64,
    #[serde(default)]
    pub user_name: Option<String>,
}

pub fn parse_monitor_params(params: Option<Value>) -> Result<MonitorParams, ErrorInfo> {
    let parsed: MonitorParams = decode(params)?;
    if let Some(user_id) = parsed.user_id {
        require_user_id(user_id)?;
    }
    Ok(parsed)
}

pub fn parse_user_query(params: Option<Value>) -> Result<UserQueryParams, ErrorInfo> {
    let parsed: UserQueryParams = decode(params)?;
    require_user_id(parsed.user_id)?;
    Ok(parsed)
}

pub fn parse_save_alert_settings(
    params: Option<Value>,
) -> Result<SaveAlertSettingsParams, ErrorInfo> {
    let parsed: SaveAlertSettingsParams = decode(params)?;
    require_user_id(parsed.user_id)?;
    if parsed.settings.phone_number.len() > 32 {
        return Err(ErrorInfo::new(
            "invalid_params",
            "phone_number must be 32 characters or fewer",
        ));
    }
    Ok(parsed)
}

pub fn parse_test_alert(params: Option<Value>) -> Result<TestAlertParams, ErrorInfo> {
    let parsed: TestAlertParams = decode(params)?;
    require_user_id(parsed.user_id)?;
    Ok(parsed)
}

fn decode<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorInfo> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }
    serde_json::from_value(params)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("params are invalid: {}", err)))
}

fn require_user_id(user_id: i64) -> Result<(), ErrorInfo> {
    if user_id <= 0 {
        return Err(ErrorInfo::new(
            "invalid_params",
            "user_id must be a positive integer",
        ));
    }
    Ok(())
}

/// Formats whole seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_elapsed_with_zero_padding() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(61), "00:01:01");
        assert_eq!(format_elapsed(3 * 3600 + 5), "03:00:05");
    }

    #[test]
    fn formats_elapsed_past_one_day_without_wrapping() {
        assert_eq!(format_elapsed(100 * 3600 + 59 * 60 + 59), "100:59:59");
    }

    #[test]
    fn monitor_params_allow_missing_user() {
        let parsed = parse_monitor_params(None).expect("params");
        assert_eq!(parsed.user_id, None);
    }

    #[test]
    fn monitor_params_reject_non_positive_user() {
        let err = parse_monitor_params(Some(json!({"user_id": 0}))).expect_err("zero user");
        assert_eq!(err.code, "invalid_params");
        assert!(parse_monitor_params(Some(json!({"user_id": -4}))).is_err());
    }

    #[test]
    fn user_query_requires_user_id() {
        let err = parse_user_query(Some(json!({"limit": 5}))).expect_err("missing user");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn user_query_clamps_limit() {
        let parsed = parse_user_query(Some(json!({"user_id": 3, "limit": 5000}))).expect("ok");
        assert_eq!(parsed.effective_limit(DEFAULT_LIST_LIMIT), MAX_LIST_LIMIT);

        let parsed = parse_user_query(Some(json!({"user_id": 3}))).expect("ok");
        assert_eq!(parsed.effective_limit(DEFAULT_LIST_LIMIT), DEFAULT_LIST_LIMIT);

        let parsed = parse_user_query(Some(json!({"user_id": 3, "limit": 0}))).expect("ok");
        assert_eq!(parsed.effective_limit(DEFAULT_LIST_LIMIT), 1);
    }

    #[test]
    fn rejects_non_object_params() {
        let err = parse_user_query(Some(json!([1, 2]))).expect_err("array params");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_test_alert(Some(json!({"user_id": 1, "channel": "sms"}))).is_err());
    }

    #[test]
    fn alert_settings_fill_missing_fields_with_defaults() {
        let parsed = parse_save_alert_settings(Some(json!({
            "user_id": 9,
            "settings": {"sms_enabled": true, "phone_number": "+15550100"}
        })))
        .expect("settings");
        assert!(parsed.settings.email_enabled);
        assert!(parsed.settings.sms_enabled);
        assert!(parsed.settings.alert_on_detect);
        assert_eq!(parsed.settings.threshold_minutes, 30);
    }

    #[test]
    fn rejects_oversized_phone_number() {
        let err = parse_save_alert_settings(Some(json!({
            "user_id": 9,
            "settings": {"phone_number": "9".repeat(64)}
        })))
        .expect_err("long phone");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn summary_flattens_monitor_view() {
        let summary = MonitorSummary {
            monitor: MonitorView {
                status: MonitorStatus::Paused,
                elapsed_seconds: 65,
                elapsed_display: format_elapsed(65),
                game_detected: false,
                game_title: "No game detected".to_string(),
            },
            total_sessions: 2,
            total_play_time_display: "00:10:00".to_string(),
            last_session_seconds: 240,
        };
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["status"], "paused");
        assert_eq!(value["elapsed_display"], "00:01:05");
        assert_eq!(value["total_sessions"], 2);
        assert_eq!(value["last_session_seconds"], 240);
    }

    #[test]
    fn method_names_are_snake_case() {
        let request = Request::new(Method::MonitorStart, None, None);
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["method"], "monitor_start");
    }
}
