//! Time source and elapsed-time accumulation.

use std::time::{Duration, Instant};

/// Monotonic time source. Injected so tests can drive time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cumulative active time across Running segments.
///
/// `accumulated` only grows until `reset`; a segment is open exactly while
/// `segment_start` is set.
#[derive(Debug, Default, Clone)]
pub struct ElapsedAccumulator {
    accumulated: Duration,
    segment_start: Option<Instant>,
}

impl ElapsedAccumulator {
    pub fn begin_segment(&mut self, now: Instant) {
        if self.segment_start.is_none() {
            self.segment_start = Some(now);
        }
    }

    pub fn end_segment(&mut self, now: Instant) {
        if let Some(start) = self.segment_start.take() {
            self.accumulated += now.saturating_duration_since(start);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.segment_start {
            Some(start) => self.accumulated + now.saturating_duration_since(start),
            None => self.accumulated,
        }
    }

    #[cfg(test)]
    pub fn has_open_segment(&self) -> bool {
        self.segment_start.is_some()
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.segment_start = None;
    }
}
