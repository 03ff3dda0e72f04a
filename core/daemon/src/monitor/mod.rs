//! Monitoring session state machine.
//!
//! A single `Monitor` owns the Stopped/Running/Paused lifecycle, the elapsed
//! accumulator and the current detection state behind one mutex. IPC handlers
//! and the detection thread share it through an `Arc`.
//!
//! Side effects (persistence, alerts, observer dispatch) always run after the
//! lock is released. Their failures are logged and never undo a transition.

use playwatch_daemon_protocol::{format_elapsed, MonitorStatus, MonitorSummary, MonitorView};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::alerts::AlertTrigger;
use crate::clock::{Clock, ElapsedAccumulator};
use crate::detector::NO_GAME_TITLE;
use crate::dispatch::{Dispatcher, EventPayload, MonitorEvent, MonitorObserver};
use crate::store::{MonitorStore, UserMonitorStats};

mod poller;

pub use poller::spawn_detection_loop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionState {
    pub game_detected: bool,
    pub game_title: String,
    /// Last game seen during the current session; survives pause/resume.
    pub session_game_name: Option<String>,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            game_detected: false,
            game_title: NO_GAME_TITLE.to_string(),
            session_game_name: None,
        }
    }
}

impl DetectionState {
    fn clear_current(&mut self) {
        self.game_detected = false;
        self.game_title = NO_GAME_TITLE.to_string();
    }
}

#[derive(Debug, Default)]
struct MonitorInner {
    status: MonitorStatus,
    owner_user_id: Option<i64>,
    elapsed: ElapsedAccumulator,
    detection: DetectionState,
    /// Bumped on every stop so in-flight detection samples can tell their
    /// session is gone.
    epoch: u64,
    threshold_alerted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub status: MonitorStatus,
    pub elapsed_seconds: u64,
    pub game_detected: bool,
    pub game_title: String,
}

impl MonitorSnapshot {
    pub fn view(&self) -> MonitorView {
        MonitorView {
            status: self.status,
            elapsed_seconds: self.elapsed_seconds,
            elapsed_display: format_elapsed(self.elapsed_seconds),
            game_detected: self.game_detected,
            game_title: self.game_title.clone(),
        }
    }

    fn payload(&self) -> EventPayload {
        EventPayload {
            status: self.status,
            elapsed_seconds: self.elapsed_seconds,
            game_detected: self.game_detected,
            game_title: self.game_title.clone(),
        }
    }
}

/// What a stop captured before the session was reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedSession {
    pub elapsed: Duration,
    /// `elapsed` truncated to whole seconds, as stored.
    pub elapsed_seconds: u64,
    pub user_id: Option<i64>,
    pub game_name: Option<String>,
}

pub struct Monitor {
    inner: Mutex<MonitorInner>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn MonitorStore>,
    alerts: Arc<AlertTrigger>,
    dispatcher: Dispatcher,
}

impl Monitor {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn MonitorStore>,
        alerts: Arc<AlertTrigger>,
        observer: Option<Arc<dyn MonitorObserver>>,
    ) -> Self {
        Self {
            inner: Mutex::new(MonitorInner::default()),
            clock,
            store,
            alerts,
            dispatcher: Dispatcher::new(observer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_locked(&self, inner: &MonitorInner) -> MonitorSnapshot {
        MonitorSnapshot {
            status: inner.status,
            elapsed_seconds: inner.elapsed.elapsed(self.clock.now()).as_secs(),
            game_detected: inner.detection.game_detected,
            game_title: inner.detection.game_title.clone(),
        }
    }

    /// Starts a session or resumes a paused one. Already running is a no-op.
    pub fn start(&self, user_id: Option<i64>) -> MonitorSnapshot {
        let snapshot = {
            let mut inner = self.lock();
            if inner.status != MonitorStatus::Running {
                if inner.owner_user_id.is_none() {
                    inner.owner_user_id = user_id;
                }
                inner.detection.clear_current();
                inner.elapsed.begin_segment(self.clock.now());
                inner.status = MonitorStatus::Running;
                tracing::info!(
                    user_id = ?inner.owner_user_id,
                    epoch = inner.epoch,
                    "Monitoring started"
                );
            }
            self.snapshot_locked(&inner)
        };
        self.dispatcher
            .dispatch(MonitorEvent::Start, &snapshot.payload());
        snapshot
    }

    /// Pauses a running session. Any other state is a no-op.
    pub fn pause(&self) -> MonitorSnapshot {
        let snapshot = {
            let mut inner = self.lock();
            if inner.status == MonitorStatus::Running {
                inner.elapsed.end_segment(self.clock.now());
                inner.status = MonitorStatus::Paused;
                tracing::info!(
                    elapsed_secs = inner.elapsed.elapsed(self.clock.now()).as_secs(),
                    "Monitoring paused"
                );
            }
            self.snapshot_locked(&inner)
        };
        self.dispatcher
            .dispatch(MonitorEvent::Pause, &snapshot.payload());
        snapshot
    }

    /// Ends the session, resets all in-memory state and commits the session
    /// when it has an owner and positive elapsed time.
    pub fn stop(&self) -> FinalizedSession {
        let (finalized, snapshot) = {
            let mut inner = self.lock();
            let now = self.clock.now();
            inner.elapsed.end_segment(now);
            let elapsed = inner.elapsed.elapsed(now);
            let finalized = FinalizedSession {
                elapsed,
                elapsed_seconds: elapsed.as_secs(),
                user_id: inner.owner_user_id,
                game_name: inner.detection.session_game_name.clone(),
            };

            inner.status = MonitorStatus::Stopped;
            inner.owner_user_id = None;
            inner.elapsed.reset();
            inner.detection = DetectionState::default();
            inner.threshold_alerted = false;
            inner.epoch = inner.epoch.wrapping_add(1);

            (finalized, self.snapshot_locked(&inner))
        };

        tracing::info!(
            user_id = ?finalized.user_id,
            elapsed_secs = finalized.elapsed_seconds,
            game = ?finalized.game_name,
            "Monitoring stopped"
        );

        match finalized.user_id {
            Some(user_id) if finalized.elapsed > Duration::ZERO => {
                if let Err(err) = self.store.finalize_session(
                    user_id,
                    finalized.elapsed_seconds,
                    finalized.game_name.as_deref(),
                ) {
                    tracing::warn!(user_id, error = %err, "Failed to record monitor session");
                }
            }
            _ => {
                tracing::debug!("Skipping session finalize (no owner or zero elapsed)");
            }
        }

        self.dispatcher
            .dispatch(MonitorEvent::Stop, &snapshot.payload());
        finalized
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let inner = self.lock();
        inner.elapsed.elapsed(self.clock.now()).as_secs()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.lock();
        self.snapshot_locked(&inner)
    }

    pub fn owner_user_id(&self) -> Option<i64> {
        self.lock().owner_user_id
    }

    /// Current view plus the user's stored totals. Totals read as zero when
    /// there is no user or the store is unavailable.
    pub fn summary(&self, user_id: Option<i64>) -> MonitorSummary {
        let view = self.snapshot().view();
        let stats = match user_id {
            Some(user_id) => self.store.user_stats(user_id).unwrap_or_else(|err| {
                tracing::warn!(user_id, error = %err, "Failed to load monitor stats");
                UserMonitorStats::default()
            }),
            None => UserMonitorStats::default(),
        };
        MonitorSummary {
            monitor: view,
            total_sessions: stats.total_sessions,
            total_play_time_display: format_elapsed(stats.total_play_seconds),
            last_session_seconds: stats.last_session_seconds,
        }
    }

    #[cfg(test)]
    fn segment_invariant_holds(&self) -> bool {
        let inner = self.lock();
        inner.elapsed.has_open_segment() == (inner.status == MonitorStatus::Running)
    }
}
