//! Fragment bitmaps: rescaling second-resolution availability to a zoom's
//! unit length, run extraction and nearest-fragment search.
//!
//! `bitmap[i]` describes `[buffer.start + i * unit, buffer.start + (i + 1) * unit)`.
//! Values are presence counts; anything `> 0` means recorded video exists.

use chrono::{DateTime, Duration, Utc};

use crate::time_utils::{TimeRange, SECOND_MS};

/// Number of `unit_len_secs` elements needed to cover `ms` milliseconds.
pub fn unit_count_ms(ms: i64, unit_len_secs: u32) -> usize {
    if ms <= 0 {
        return 0;
    }
    let unit_ms = unit_len_secs.max(1) as i64 * SECOND_MS;
    ((ms + unit_ms - 1) / unit_ms) as usize
}

/// Number of elements a bitmap over `range` has at `unit_len_secs`.
pub fn unit_count(range: &TimeRange, unit_len_secs: u32) -> usize {
    unit_count_ms(range.duration_ms(), unit_len_secs)
}

/// Rescale second-resolution `source` (whose element 0 starts at
/// `source_start`) to one element per `unit_len_secs` over
/// `[range_start, range_end)`.
///
/// Each output element is 1 when any second in its window is present. A
/// trailing partial unit is emitted from whatever seconds remain. Seconds
/// outside `source` count as absent. At unit length 1 the source values are
/// copied through unchanged.
pub fn convert_second_data_to_scale(
    source: &[u8],
    unit_len_secs: u32,
    source_start: DateTime<Utc>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Vec<u8> {
    let unit = unit_len_secs.max(1) as i64;
    let total_secs = unit_count_ms((range_end - range_start).num_milliseconds(), 1) as i64;
    let first = (range_start - source_start).num_milliseconds().div_euclid(SECOND_MS);
    let at = |s: i64| -> u8 {
        if s < 0 {
            return 0;
        }
        source.get(s as usize).copied().unwrap_or(0)
    };

    if unit == 1 {
        return (0..total_secs).map(|k| at(first + k)).collect();
    }

    let units = (total_secs + unit - 1) / unit;
    let mut out = Vec::with_capacity(units as usize);
    for i in 0..units {
        let from = i * unit;
        let to = (from + unit).min(total_secs);
        let has_frame = (from..to).any(|k| at(first + k) > 0);
        out.push(has_frame as u8);
    }
    out
}

/// Contiguous runs of present units, as time ranges clipped to `buffer`.
pub fn fragment_ranges(bitmap: &[u8], buffer: &TimeRange, unit_len_secs: u32) -> Vec<TimeRange> {
    let unit = Duration::seconds(unit_len_secs.max(1) as i64);
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &v) in bitmap.iter().enumerate() {
        match (v > 0, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                ranges.push(run_to_range(s, i, buffer, unit));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        ranges.push(run_to_range(s, bitmap.len(), buffer, unit));
    }
    ranges
}

fn run_to_range(from: usize, to: usize, buffer: &TimeRange, unit: Duration) -> TimeRange {
    let start = buffer.start + unit * from as i32;
    let end = (buffer.start + unit * to as i32).min(buffer.end);
    TimeRange::new(start, end)
}

/// Where a click at `time` should seek to.
///
/// Returns `time` itself when its unit has video, otherwise the start of the
/// next present unit. `None` when the buffer does not cover `time` or no
/// later fragment exists.
pub fn find_nearest_available_fragment(
    time: DateTime<Utc>,
    bitmap: &[u8],
    buffer: &TimeRange,
    unit_len_secs: u32,
) -> Option<DateTime<Utc>> {
    if !buffer.contains(time) {
        return None;
    }
    let unit_ms = unit_len_secs.max(1) as i64 * SECOND_MS;
    let idx = ((time - buffer.start).num_milliseconds() / unit_ms) as usize;
    if *bitmap.get(idx)? > 0 {
        return Some(time);
    }
    bitmap[idx + 1..]
        .iter()
        .position(|&v| v > 0)
        .map(|off| buffer.start + Duration::milliseconds((idx + 1 + off) as i64 * unit_ms))
}

/// End of the fragment that contains `time`, used to detect when playback
/// is about to leave recorded video.
pub fn fragment_end_at(ranges: &[TimeRange], time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ranges.iter().find(|r| r.contains(time)).map(|r| r.end)
}

/// Start of the first fragment beginning strictly after `time`.
pub fn next_fragment_start(ranges: &[TimeRange], time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ranges.iter().map(|r| r.start).find(|&s| s > time)
}
