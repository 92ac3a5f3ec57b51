//! Injectable time source
//!
//! Every time-windowed decision (cooldowns, rate buckets, day boundaries)
//! reads the clock through this trait, so the whole engine runs against a
//! fake clock in tests.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Source of current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.write() = t;
    }

    /// Move forward by a duration.
    pub fn advance(&self, d: chrono::Duration) {
        let mut now = self.now.write();
        *now += d;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
