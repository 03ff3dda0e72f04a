//! Background game detection.
//!
//! Each tick samples the process list outside the monitor lock, then applies
//! the result only if the same session is still running.

use playwatch_daemon_protocol::MonitorStatus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::Monitor;
use crate::detector::GameDetector;
use crate::dispatch::MonitorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Monitor was not running; nothing sampled.
    Idle,
    /// The session stopped or paused while sampling.
    Discarded,
    Unchanged,
    Changed(MonitorEvent),
}

impl Monitor {
    /// Runs one detection tick.
    pub fn poll_once(&self, detector: &GameDetector) -> PollOutcome {
        let epoch = {
            let inner = self.lock();
            if inner.status != MonitorStatus::Running {
                return PollOutcome::Idle;
            }
            inner.epoch
        };

        let detection = detector.detect();

        let (outcome, owner, snapshot) = {
            let mut inner = self.lock();
            if inner.status != MonitorStatus::Running || inner.epoch != epoch {
                tracing::debug!(epoch, "Discarding stale detection sample");
                return PollOutcome::Discarded;
            }

            let current = &inner.detection;
            let changed = detection.matched != current.game_detected
                || (detection.matched && detection.label != current.game_title);
            if !changed {
                (PollOutcome::Unchanged, inner.owner_user_id, None)
            } else {
                inner.detection.game_detected = detection.matched;
                inner.detection.game_title = detection.label.clone();
                let event = if detection.matched {
                    inner.detection.session_game_name = Some(detection.label.clone());
                    MonitorEvent::GameOn
                } else {
                    MonitorEvent::GameOff
                };
                (
                    PollOutcome::Changed(event),
                    inner.owner_user_id,
                    Some(self.snapshot_locked(&inner)),
                )
            }
        };

        if let PollOutcome::Changed(event) = outcome {
            tracing::info!(
                event = event.as_str(),
                game = %detection.label,
                user_id = ?owner,
                "Game detection changed"
            );
            if event == MonitorEvent::GameOn {
                self.alerts.trigger_game_alert(owner, &detection.label);
            }
            if let Some(snapshot) = snapshot {
                self.dispatcher.dispatch(event, &snapshot.payload());
            }
        }

        if let Some(owner) = owner {
            self.check_threshold(owner, epoch);
        }

        outcome
    }

    /// Sends the play-time alert the first time a session crosses the
    /// owner's threshold.
    fn check_threshold(&self, owner: i64, epoch: u64) {
        if self.lock().threshold_alerted {
            return;
        }

        let settings = self.alerts.settings_for(owner);
        if settings.threshold_minutes == 0 {
            return;
        }
        let threshold_secs = u64::from(settings.threshold_minutes) * 60;

        let fired = {
            let mut inner = self.lock();
            let elapsed = inner.elapsed.elapsed(self.clock.now()).as_secs();
            let same_session = inner.epoch == epoch && inner.owner_user_id == Some(owner);
            if same_session && !inner.threshold_alerted && elapsed >= threshold_secs {
                inner.threshold_alerted = true;
                Some((elapsed, inner.detection.session_game_name.clone()))
            } else {
                None
            }
        };

        if let Some((elapsed, game_name)) = fired {
            tracing::info!(
                user_id = owner,
                threshold_minutes = settings.threshold_minutes,
                elapsed_secs = elapsed,
                "Play time threshold reached"
            );
            self.alerts.trigger_threshold_alert(
                owner,
                settings.threshold_minutes,
                elapsed,
                game_name.as_deref(),
            );
        }
    }
}

/// Spawns the detection thread. It runs for the life of the process.
pub fn spawn_detection_loop(
    monitor: Arc<Monitor>,
    detector: GameDetector,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        thread::sleep(interval);
        monitor.poll_once(&detector);
    })
}
