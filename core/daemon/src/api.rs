//! Request routing for the daemon socket.

use playwatch_daemon_protocol::{
    format_elapsed, parse_monitor_params, parse_save_alert_settings, parse_test_alert,
    parse_user_query, ErrorInfo, GameHistoryView, Method, Request, Response, TestAlertResult,
    PROTOCOL_VERSION,
};
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::AlertTrigger;
use crate::monitor::Monitor;
use crate::store::MonitorStore;

/// Everything a request handler can touch.
pub struct Services {
    pub monitor: Arc<Monitor>,
    pub store: Arc<dyn MonitorStore>,
    pub alerts: Arc<AlertTrigger>,
    pub history_limit: usize,
    pub poll_interval_secs: u64,
}

pub fn handle_request(request: Request, services: &Services) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let id = request.id;
    let params = request.params;
    match request.method {
        Method::GetHealth => Response::ok(
            id,
            serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "poll_interval_secs": services.poll_interval_secs,
                "monitor_status": services.monitor.snapshot().status,
                "elapsed_seconds": services.monitor.elapsed_seconds(),
            }),
        ),
        Method::MonitorStart => {
            let parsed = match parse_monitor_params(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let snapshot = services.monitor.start(parsed.user_id);
            respond(id, "monitor view", Ok(snapshot.view()))
        }
        Method::MonitorPause => {
            let snapshot = services.monitor.pause();
            respond(id, "monitor view", Ok(snapshot.view()))
        }
        Method::MonitorStop => {
            let parsed = match parse_monitor_params(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let finalized = services.monitor.stop();
            let user_id = parsed.user_id.or(finalized.user_id);
            respond(id, "monitor summary", Ok(services.monitor.summary(user_id)))
        }
        Method::MonitorStatus => {
            let parsed = match parse_monitor_params(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let user_id = parsed.user_id.or_else(|| services.monitor.owner_user_id());
            respond(id, "monitor summary", Ok(services.monitor.summary(user_id)))
        }
        Method::GameHistory => {
            let parsed = match parse_user_query(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let limit = parsed.effective_limit(services.history_limit);
            let result = services
                .store
                .game_history(parsed.user_id, limit)
                .map(|entries| {
                    entries
                        .into_iter()
                        .map(|entry| GameHistoryView {
                            play_time: format_elapsed(entry.play_seconds),
                            game_name: entry.game_name,
                            play_seconds: entry.play_seconds,
                            played_at: entry.played_at,
                        })
                        .collect::<Vec<_>>()
                })
                .map_err(ErrorInfo::from);
            respond(id, "game history", result)
        }
        Method::GetAlertSettings => {
            let parsed = match parse_user_query(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let result = services
                .store
                .alert_settings(parsed.user_id)
                .map(Option::unwrap_or_default)
                .map_err(ErrorInfo::from);
            respond(id, "alert settings", result)
        }
        Method::SaveAlertSettings => {
            let parsed = match parse_save_alert_settings(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            match services
                .store
                .save_alert_settings(parsed.user_id, &parsed.settings)
            {
                Ok(()) => {
                    tracing::info!(user_id = parsed.user_id, "Alert settings saved");
                    Response::ok(id, serde_json::json!({ "saved": true }))
                }
                Err(err) => Response::error_with_info(id, err.into()),
            }
        }
        Method::GetAlertLog => {
            let parsed = match parse_user_query(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let limit = parsed.effective_limit(services.history_limit);
            let result = services
                .store
                .alert_log(parsed.user_id, limit)
                .map_err(ErrorInfo::from);
            respond(id, "alert log", result)
        }
        Method::TestAlert => {
            let parsed = match parse_test_alert(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(id, err),
            };
            let user_name = parsed
                .user_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("user {}", parsed.user_id));
            let channels = services.alerts.test_alert(parsed.user_id, &user_name);
            respond(
                id,
                "test alert result",
                Ok(TestAlertResult {
                    sent: true,
                    channels,
                }),
            )
        }
        Method::GetMailStatus => respond(id, "mail status", Ok(services.alerts.mail_status())),
    }
}

fn respond<T: Serialize>(id: Option<String>, what: &str, result: Result<T, ErrorInfo>) -> Response {
    let data = match result {
        Ok(data) => data,
        Err(err) => return Response::error_with_info(id, err),
    };
    match serde_json::to_value(data) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize {}: {}", what, err),
        ),
    }
}
