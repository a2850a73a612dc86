//! Time source for every timestamped insert.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that advances by a fixed step on every reading.
///
/// Used by tests and data replays that need strictly increasing,
/// reproducible timestamps.
#[derive(Debug)]
pub struct StepClock {
    next: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        // A poisoned lock still holds a valid timestamp.
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let current = *next;
        *next = current + self.step;
        current
    }
}
