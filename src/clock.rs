//! Time source shared by request handlers and background jobs.
//!
//! Nothing else in the crate calls `Utc::now()` directly. Record timestamps and
//! trending ages are all read through a [`Clock`], so the configured offset
//! applies to both sides of every age calculation.

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System time shifted by a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: Duration,
}

impl SystemClock {
    #[must_use]
    pub fn with_offset_hours(hours: i64) -> Self {
        Self {
            offset: Duration::hours(hours),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::with_offset_hours(1)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }
}

/// A clock that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
