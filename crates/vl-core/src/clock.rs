//! Date and wall-clock formatting in one fixed civil offset.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};

/// Default offset: UTC+09:00.
pub const DEFAULT_OFFSET_SECONDS: i32 = 9 * 3600;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// A calendar date and a wall-clock time, both already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM:SS`.
    pub time: String,
}

impl Stamp {
    /// Formats `instant` in the given offset.
    pub fn at<Tz: TimeZone>(instant: &DateTime<Tz>, offset: FixedOffset) -> Self {
        let local = instant.with_timezone(&offset);
        Self {
            date: local.format(DATE_FORMAT).to_string(),
            time: local.format(TIME_FORMAT).to_string(),
        }
    }
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> Stamp;

    /// The offset every stamp from this clock is expressed in.
    fn offset(&self) -> FixedOffset;
}

/// Wall clock in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Builds a clock from an offset in minutes east of UTC.
    ///
    /// Returns `None` when the offset is outside ±24 hours.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(DEFAULT_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix());
        Self::new(offset)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Stamp {
        Stamp::at(&Utc::now(), self.offset)
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// A clock that always returns the same stamp.
#[derive(Debug, Clone)]
pub struct FixedClock {
    stamp: Stamp,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            stamp: Stamp {
                date: date.into(),
                time: time.into(),
            },
            offset: SystemClock::default().offset,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Stamp {
        self.stamp.clone()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
