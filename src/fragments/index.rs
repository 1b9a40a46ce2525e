// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Fragment index: sparse cache of second-resolution availability.
//!
//! Two caches live side by side:
//!
//! * **DayCache** (plain recordings): local `YYYY-MM-DD` key → one element
//!   per second of that day. A present key means the whole day was fetched
//!   in one request; only the live day ("today") may be shorter, ending at
//!   the moment it was fetched.
//! * **IntervalCache** (motion/object filtered): 30-minute aligned epoch-ms
//!   key → one element per second of that interval. Valid for a single
//!   filter signature only; a different signature wipes it.
//!
//! Entries are only ever added or replaced wholesale, never patched. Any
//! resolution the timeline needs is produced by [`FragmentIndex::merge_for_range`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use parking_lot::RwLock;

use crate::fragments::bitmap::{convert_second_data_to_scale, unit_count};
use crate::time_utils::{self, TimeRange, DAY_MS, INTERVAL_MS, SECOND_MS};

/// Which cache a lookup or merge reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Raw recording presence, cached per day.
    Plain,
    /// Motion/object filtered presence, cached per 30-minute interval.
    Filtered,
}

/// A bitmap at some unit length together with the range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTimeline {
    pub timeline: Vec<u8>,
    pub buffer_range: TimeRange,
    pub unit_len_secs: u32,
}

/// Shared handle through which schedulers of the same camera reach one cache.
pub type SharedFragmentIndex = Arc<RwLock<FragmentIndex>>;

/// Per-camera availability cache.
pub struct FragmentIndex {
    offset: FixedOffset,
    days: HashMap<String, Vec<u8>>,
    intervals: BTreeMap<i64, Vec<u8>>,
    interval_signature: Option<String>,
    live_refresh: Option<Duration>,
}

impl FragmentIndex {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            days: HashMap::new(),
            intervals: BTreeMap::new(),
            interval_signature: None,
            live_refresh: None,
        }
    }

    /// Treat a partially covered (live) day or interval as missing again once
    /// its coverage is older than `refresh`.
    pub fn with_live_refresh(mut self, refresh: Option<Duration>) -> Self {
        self.live_refresh = refresh;
        self
    }

    pub fn set_live_refresh(&mut self, refresh: Option<Duration>) {
        self.live_refresh = refresh;
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Store the second-resolution bitmap of a whole day.
    pub fn record_day(&mut self, day_key: &str, bitmap: Vec<u8>) {
        self.days.insert(day_key.to_string(), bitmap);
    }

    /// Store the second-resolution bitmap of one 30-minute interval.
    pub fn record_interval(&mut self, interval_key: i64, bitmap: Vec<u8>) {
        self.intervals.insert(interval_key, bitmap);
    }

    pub fn has_day(&self, day_key: &str) -> bool {
        self.days.contains_key(day_key)
    }

    pub fn has_interval(&self, interval_key: i64) -> bool {
        self.intervals.contains_key(&interval_key)
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    /// Signature of the filter the IntervalCache currently holds results for.
    pub fn interval_signature(&self) -> Option<&str> {
        self.interval_signature.as_deref()
    }

    /// Bind the IntervalCache to `signature`. Returns `true` when the cache
    /// held results for a different filter and was wiped.
    pub fn ensure_interval_signature(&mut self, signature: &str) -> bool {
        if self.interval_signature.as_deref() == Some(signature) {
            return false;
        }
        let had_other = self.interval_signature.is_some() || !self.intervals.is_empty();
        self.intervals.clear();
        self.interval_signature = Some(signature.to_string());
        had_other
    }

    /// Drop all filtered results (filter off).
    pub fn clear_intervals(&mut self) {
        self.intervals.clear();
        self.interval_signature = None;
    }

    /// Drop everything (camera switch).
    pub fn clear(&mut self) {
        self.days.clear();
        self.clear_intervals();
    }

    /// Local day starts in `range` that still need a fetch, oldest first.
    /// Days starting after `now` are never missing.
    pub fn missing_days(&self, range: &TimeRange, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut missing = Vec::new();
        if range.is_empty() {
            return missing;
        }
        let mut day = time_utils::start_of_day(range.start, self.offset);
        while day < range.end && day <= now {
            let key = time_utils::day_key(day, self.offset);
            match self.days.get(&key) {
                None => missing.push(day),
                Some(seconds) if self.is_stale(day, DAY_MS, seconds.len(), now) => missing.push(day),
                Some(_) => {}
            }
            day += Duration::milliseconds(DAY_MS);
        }
        missing
    }

    /// 30-minute interval keys in `range` that still need a fetch, oldest
    /// first. Intervals starting after `now` are never missing.
    pub fn missing_intervals(&self, range: &TimeRange, now: DateTime<Utc>) -> Vec<i64> {
        let mut missing = Vec::new();
        if range.is_empty() {
            return missing;
        }
        let now_ms = now.timestamp_millis();
        let mut key = time_utils::interval_key(range.start);
        while key < range.end.timestamp_millis() && key <= now_ms {
            match self.intervals.get(&key) {
                None => missing.push(key),
                Some(seconds) => {
                    let start = time_utils::from_epoch_ms(key);
                    if self.is_stale(start, INTERVAL_MS, seconds.len(), now) {
                        missing.push(key);
                    }
                }
            }
            key += INTERVAL_MS;
        }
        missing
    }

    /// A partial entry whose coverage lags `now` by at least the refresh age.
    fn is_stale(&self, start: DateTime<Utc>, span_ms: i64, len: usize, now: DateTime<Utc>) -> bool {
        let Some(refresh) = self.live_refresh else {
            return false;
        };
        let full = (span_ms / SECOND_MS) as usize;
        if len >= full {
            return false;
        }
        let covered_until = start + Duration::seconds(len as i64);
        now - covered_until >= refresh
    }

    /// Assemble the bitmap for `range` at `unit_len_secs` from cached data.
    ///
    /// Days or intervals that are not cached contribute zeros, so the result
    /// always has exactly `ceil(range / unit)` elements and its buffer range
    /// is `range` itself.
    pub fn merge_for_range(&self, range: &TimeRange, unit_len_secs: u32, mode: CacheMode) -> MergedTimeline {
        let total = unit_count(range, 1);
        let mut seconds = vec![0u8; total];

        match mode {
            CacheMode::Plain => {
                let mut day = time_utils::start_of_day(range.start, self.offset);
                while day < range.end {
                    let key = time_utils::day_key(day, self.offset);
                    if let Some(src) = self.days.get(&key) {
                        copy_seconds(&mut seconds, range.start, day, src);
                    }
                    day += Duration::milliseconds(DAY_MS);
                }
            }
            CacheMode::Filtered => {
                let from = time_utils::interval_key(range.start);
                let to = range.end.timestamp_millis();
                for (&key, src) in self.intervals.range(from..to) {
                    copy_seconds(&mut seconds, range.start, time_utils::from_epoch_ms(key), src);
                }
            }
        }

        MergedTimeline {
            timeline: convert_second_data_to_scale(&seconds, unit_len_secs, range.start, range.start, range.end),
            buffer_range: *range,
            unit_len_secs,
        }
    }
}

/// Copy the part of `src` (starting at `src_start`) that falls inside
/// `dst` (starting at `dst_start`).
fn copy_seconds(dst: &mut [u8], dst_start: DateTime<Utc>, src_start: DateTime<Utc>, src: &[u8]) {
    let shift = (src_start - dst_start).num_milliseconds().div_euclid(SECOND_MS);
    let from = (-shift).max(0) as usize;
    let to = (dst.len() as i64 - shift).clamp(0, src.len() as i64) as usize;
    if from >= to {
        return;
    }
    let dst_from = (shift + from as i64) as usize;
    dst[dst_from..dst_from + (to - from)].copy_from_slice(&src[from..to]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn empty_cache_merges_to_zeros() {
        let index = FragmentIndex::new(utc());
        let range = TimeRange::new(day(3) + Duration::hours(20), day(4) + Duration::hours(4));
        let merged = index.merge_for_range(&range, 60, CacheMode::Plain);
        assert_eq!(merged.buffer_range, range);
        assert_eq!(merged.timeline.len(), 8 * 60);
        assert!(merged.timeline.iter().all(|&v| v == 0));
    }

    #[test]
    fn merge_spans_day_boundary() {
        let mut index = FragmentIndex::new(utc());
        let mut d3 = vec![0u8; 86_400];
        d3[86_399] = 1; // 23:59:59 on day 3
        let mut d4 = vec![0u8; 86_400];
        d4[0] = 1; // 00:00:00 on day 4
        index.record_day("2026-02-03", d3);
        index.record_day("2026-02-04", d4);

        let range = TimeRange::new(day(4) - Duration::seconds(5), day(4) + Duration::seconds(5));
        let merged = index.merge_for_range(&range, 1, CacheMode::Plain);
        assert_eq!(merged.timeline, vec![0, 0, 0, 0, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn missing_days_skip_cached_and_future() {
        let mut index = FragmentIndex::new(utc());
        index.record_day("2026-02-05", vec![0u8; 86_400]);
        let range = TimeRange::new(day(4) + Duration::hours(12), day(9));
        let now = day(6) + Duration::hours(3);
        assert_eq!(index.missing_days(&range, now), vec![day(4), day(6)]);
    }

    #[test]
    fn live_day_goes_stale() {
        let mut index = FragmentIndex::new(utc()).with_live_refresh(Some(Duration::seconds(60)));
        index.record_day("2026-02-06", vec![1u8; 3600]);
        let range = TimeRange::new(day(6), day(6) + Duration::hours(2));
        assert!(index.missing_days(&range, day(6) + Duration::seconds(3630)).is_empty());
        assert_eq!(index.missing_days(&range, day(6) + Duration::seconds(3660)), vec![day(6)]);
    }

    #[test]
    fn intervals_and_signature() {
        let mut index = FragmentIndex::new(utc());
        let range = TimeRange::new(day(2), day(2) + Duration::hours(2));
        let now = day(3);
        assert!(!index.ensure_interval_signature("motion:{}"));
        assert_eq!(index.missing_intervals(&range, now).len(), 4);

        let key = day(2).timestamp_millis() + INTERVAL_MS;
        index.record_interval(key, vec![1u8; 1800]);
        assert_eq!(index.missing_intervals(&range, now).len(), 3);
        let merged = index.merge_for_range(&range, 1800, CacheMode::Filtered);
        assert_eq!(merged.timeline, vec![0, 1, 0, 0]);

        assert!(index.ensure_interval_signature("motion:{\"sensitivity\":3}"));
        assert_eq!(index.interval_count(), 0);
        assert_eq!(index.missing_intervals(&range, now).len(), 4);
    }

    #[test]
    fn clear_keeps_nothing() {
        let mut index = FragmentIndex::new(utc());
        index.record_day("2026-02-01", vec![1]);
        index.record_interval(0, vec![1]);
        index.clear();
        assert_eq!(index.day_count(), 0);
        assert_eq!(index.interval_count(), 0);
        assert!(index.interval_signature().is_none());
    }
}
