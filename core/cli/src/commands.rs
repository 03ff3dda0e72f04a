//! Subcommand bodies. Each one issues daemon calls and returns the `data`
//! value to print.

use crate::daemon_client::{self, ClientError};
use playwatch_daemon_protocol::{AlertSettings, Method};
use serde_json::{json, Map, Value};

/// Field-level changes requested by `alerts set`. `None` leaves the stored
/// value untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlertOverrides {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub phone_number: Option<String>,
    pub alert_on_detect: Option<bool>,
    pub threshold_minutes: Option<u32>,
}

impl AlertOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn apply_overrides(mut settings: AlertSettings, overrides: &AlertOverrides) -> AlertSettings {
    if let Some(value) = overrides.email_enabled {
        settings.email_enabled = value;
    }
    if let Some(value) = overrides.sms_enabled {
        settings.sms_enabled = value;
    }
    if let Some(phone) = &overrides.phone_number {
        settings.phone_number = phone.trim().to_string();
    }
    if let Some(value) = overrides.alert_on_detect {
        settings.alert_on_detect = value;
    }
    if let Some(value) = overrides.threshold_minutes {
        settings.threshold_minutes = value;
    }
    settings
}

pub fn health() -> Result<Value, ClientError> {
    daemon_client::call(Method::GetHealth, None)
}

pub fn monitor(method: Method, user: Option<i64>) -> Result<Value, ClientError> {
    daemon_client::call(method, Some(user_params(user, None)))
}

pub fn history(user: i64, limit: Option<u32>) -> Result<Value, ClientError> {
    daemon_client::call(Method::GameHistory, Some(user_params(Some(user), limit)))
}

pub fn alert_settings(user: i64) -> Result<Value, ClientError> {
    daemon_client::call(Method::GetAlertSettings, Some(user_params(Some(user), None)))
}

pub fn set_alert_settings(user: i64, overrides: &AlertOverrides) -> Result<Value, ClientError> {
    let current = alert_settings(user)?;
    let current: AlertSettings = serde_json::from_value(current)
        .map_err(|err| ClientError::InvalidResponse(format!("Invalid alert settings: {}", err)))?;

    if overrides.is_empty() {
        tracing::info!(user_id = user, "No alert setting changes requested");
        return serde_json::to_value(current)
            .map_err(|err| ClientError::InvalidResponse(err.to_string()));
    }

    let updated = apply_overrides(current, overrides);
    tracing::info!(user_id = user, ?updated, "Saving alert settings");
    daemon_client::call(
        Method::SaveAlertSettings,
        Some(json!({ "user_id": user, "settings": updated })),
    )?;
    serde_json::to_value(updated).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

pub fn alert_log(user: i64, limit: Option<u32>) -> Result<Value, ClientError> {
    daemon_client::call(Method::GetAlertLog, Some(user_params(Some(user), limit)))
}

pub fn test_alert(user: i64, name: Option<String>) -> Result<Value, ClientError> {
    let mut params = Map::new();
    params.insert("user_id".to_string(), json!(user));
    if let Some(name) = name {
        params.insert("user_name".to_string(), json!(name));
    }
    daemon_client::call(Method::TestAlert, Some(Value::Object(params)))
}

pub fn mail_status() -> Result<Value, ClientError> {
    daemon_client::call(Method::GetMailStatus, None)
}

fn user_params(user: Option<i64>, limit: Option<u32>) -> Value {
    let mut params = Map::new();
    if let Some(user) = user {
        params.insert("user_id".to_string(), json!(user));
    }
    if let Some(limit) = limit {
        params.insert("limit".to_string(), json!(limit));
    }
    Value::Object(params)
}
