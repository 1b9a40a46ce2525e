//! Zoom ladder: visible duration, bitmap unit length and base marker step
//! for every zoom index.

use chrono::Duration;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// One rung of the zoom ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevel {
    /// Visible duration of the viewport at this zoom.
    pub visible_ms: i64,
    /// Seconds represented by one fragment bitmap element.
    pub unit_len_secs: u32,
    /// Preferred spacing between sub-interval markers.
    pub marker_step_ms: i64,
}

impl ZoomLevel {
    pub fn visible(&self) -> Duration {
        Duration::milliseconds(self.visible_ms)
    }
}

pub const ZOOM_LEVELS: [ZoomLevel; 9] = [
    ZoomLevel { visible_ms: MINUTE_MS, unit_len_secs: 1, marker_step_ms: MINUTE_MS },
    ZoomLevel { visible_ms: 5 * MINUTE_MS, unit_len_secs: 1, marker_step_ms: MINUTE_MS },
    ZoomLevel { visible_ms: 10 * MINUTE_MS, unit_len_secs: 2, marker_step_ms: MINUTE_MS },
    ZoomLevel { visible_ms: 30 * MINUTE_MS, unit_len_secs: 5, marker_step_ms: 5 * MINUTE_MS },
    ZoomLevel { visible_ms: HOUR_MS, unit_len_secs: 10, marker_step_ms: 10 * MINUTE_MS },
    ZoomLevel { visible_ms: 3 * HOUR_MS, unit_len_secs: 30, marker_step_ms: 30 * MINUTE_MS },
    ZoomLevel { visible_ms: 6 * HOUR_MS, unit_len_secs: 60, marker_step_ms: HOUR_MS },
    ZoomLevel { visible_ms: 12 * HOUR_MS, unit_len_secs: 120, marker_step_ms: HOUR_MS },
    ZoomLevel { visible_ms: 24 * HOUR_MS, unit_len_secs: 300, marker_step_ms: 3 * HOUR_MS },
];

/// Marker steps the renderer escalates through when markers get too dense.
pub const MARKER_LADDER_MS: [i64; 6] = [
    MINUTE_MS,
    5 * MINUTE_MS,
    10 * MINUTE_MS,
    30 * MINUTE_MS,
    HOUR_MS,
    3 * HOUR_MS,
];

/// Zoom level for `index`, clamped into the ladder.
pub fn level(index: usize) -> &'static ZoomLevel {
    &ZOOM_LEVELS[clamp_index(index as i64)]
}

/// Clamp a possibly out-of-range index into `[0, len - 1]`.
pub fn clamp_index(index: i64) -> usize {
    index.clamp(0, ZOOM_LEVELS.len() as i64 - 1) as usize
}

/// Duration ratio between two zoom levels (`new / old`).
pub fn scale_ratio(old_index: usize, new_index: usize) -> f64 {
    level(new_index).visible_ms as f64 / level(old_index).visible_ms as f64
}
