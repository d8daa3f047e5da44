//! Wall-clock interval timers and failure backoff for the control loop.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Fires once per `period` of wall-clock time.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: ChronoDuration,
    last_run: Option<DateTime<Utc>>,
}

impl IntervalTimer {
    /// A fresh timer is due immediately.
    pub fn new(period: Duration) -> Self {
        Self {
            period: ChronoDuration::from_std(period).unwrap_or(ChronoDuration::MAX),
            last_run: None,
        }
    }

    /// Due when the period elapsed, or when the clock stepped backwards past
    /// the last run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now < last || now - last >= self.period,
        }
    }

    pub fn mark_run(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
    }

    /// Marks the run when due; returns whether it was.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_due(now) {
            self.mark_run(now);
            return true;
        }
        false
    }
}

/// Exponential backoff: `base * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            consecutive_failures: 0,
        }
    }

    /// Delay to wait after one more failure.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.consecutive_failures).unwrap_or(u32::MAX);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
