// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Calendar helpers: day keys, boundary classification, rounding and labels.
//!
//! All instants are `DateTime<Utc>`; calendar questions (which day, is this
//! midnight) are answered in the session's fixed UTC offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Utc};
use parking_lot::Mutex;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
/// Width of one filtered-timeline cache interval.
pub const INTERVAL_MS: i64 = 30 * MINUTE_MS;

/// A time span, `end > start` for every non-empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range of `duration` starting at `start`.
    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> Self {
        Self { start, end: start + duration }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Half-open containment: `start <= t < end`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Grow the range by `margin` on both sides.
    pub fn expand(&self, margin: Duration) -> Self {
        Self { start: self.start - margin, end: self.end + margin }
    }

    /// Shift the whole range by `delta`.
    pub fn shift(&self, delta: Duration) -> Self {
        Self { start: self.start + delta, end: self.end + delta }
    }
}

/// Source of "now" for scheduling decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used for replay and tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn local_ms(t: DateTime<Utc>, offset: FixedOffset) -> i64 {
    t.timestamp_millis() + offset.local_minus_utc() as i64 * SECOND_MS
}

fn from_local_ms(ms: i64, offset: FixedOffset) -> DateTime<Utc> {
    from_epoch_ms(ms - offset.local_minus_utc() as i64 * SECOND_MS)
}

/// Instant for an epoch-millisecond value, saturating at chrono's limits.
pub fn from_epoch_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Round `t` down to a multiple of `step_ms` in local time.
pub fn floor_to(t: DateTime<Utc>, step_ms: i64, offset: FixedOffset) -> DateTime<Utc> {
    let ms = local_ms(t, offset);
    from_local_ms(ms.div_euclid(step_ms) * step_ms, offset)
}

/// Round `t` up to a multiple of `step_ms` in local time.
pub fn ceil_to(t: DateTime<Utc>, step_ms: i64, offset: FixedOffset) -> DateTime<Utc> {
    let floored = floor_to(t, step_ms, offset);
    if floored == t {
        t
    } else {
        floored + Duration::milliseconds(step_ms)
    }
}

/// Whether `t` lies exactly on a `step_ms` boundary in local time.
pub fn is_aligned(t: DateTime<Utc>, step_ms: i64, offset: FixedOffset) -> bool {
    local_ms(t, offset).rem_euclid(step_ms) == 0
}

pub fn is_start_of_day(t: DateTime<Utc>, offset: FixedOffset) -> bool {
    is_aligned(t, DAY_MS, offset)
}

pub fn is_start_of_hour(t: DateTime<Utc>, offset: FixedOffset) -> bool {
    is_aligned(t, HOUR_MS, offset)
}

pub fn is_half_hour(t: DateTime<Utc>, offset: FixedOffset) -> bool {
    is_aligned(t, INTERVAL_MS, offset)
}

/// Local midnight of the day containing `t`.
pub fn start_of_day(t: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    floor_to(t, DAY_MS, offset)
}

/// Last whole second of the day containing `t` (23:59:59 local).
pub fn end_of_day(t: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    start_of_day(t, offset) + Duration::milliseconds(DAY_MS - SECOND_MS)
}

/// `YYYY-MM-DD` key of the local day containing `t`.
pub fn day_key(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

/// Epoch-ms key of the 30-minute interval containing `t`.
pub fn interval_key(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis().div_euclid(INTERVAL_MS) * INTERVAL_MS
}

/// Local calendar fields `[Y, M, D, h, m, s]` as the archive RPC expects.
pub fn rpc_time(t: DateTime<Utc>, offset: FixedOffset) -> [i32; 6] {
    let l = t.with_timezone(&offset);
    [
        l.year(),
        l.month() as i32,
        l.day() as i32,
        l.hour() as i32,
        l.minute() as i32,
        l.second() as i32,
    ]
}

/// `HH:MM` label for hour and sub-interval markers.
pub fn format_time_label(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%H:%M").to_string()
}

/// `DD.MM.YYYY` label for day markers.
pub fn format_date_label(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%d.%m.%Y").to_string()
}

/// Full label shown next to the hover cursor.
pub fn format_cursor_label(t: DateTime<Utc>, offset: FixedOffset) -> String {
    t.with_timezone(&offset).format("%d.%m.%Y %H:%M:%S").to_string()
}
