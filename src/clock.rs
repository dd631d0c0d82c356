//! Wall-clock collaborator.
//!
//! The byte codec needs `(year, month, day, hour, minute, second)` to pack
//! DOS timestamps. Rather than calling `chrono::Local::now()` directly from
//! deep inside the directory/file engines, every timestamp-producing
//! operation takes a `&dyn Clock`, so tests can freeze time and get
//! deterministic output regardless of when the test actually runs.

use chrono::{Datelike, Local, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

pub trait Clock {
    fn now(&self) -> WallClock;
}

/// Reads the host system clock via `chrono::Local`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> WallClock {
        let now = Local::now();
        WallClock {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
        }
    }
}

/// A clock that always returns the same instant; used by tests and by the
/// "clock unavailable" fallback path (`day=1, month=1, year=1980,
/// time=00:00:00`).
pub struct FixedClock(pub WallClock);

impl Clock for FixedClock {
    fn now(&self) -> WallClock {
        self.0
    }
}

pub const DOS_EPOCH: WallClock = WallClock { year: 1980, month: 1, day: 1, hour: 0, minute: 0, second: 0 };
