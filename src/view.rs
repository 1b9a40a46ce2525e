//! Timeline view model: visible range, zoom, hover cursor and the gesture
//! state machine that turns pointer and wheel input into range changes.
//!
//! Mouse and touch share one state machine. A mouse press pans right away;
//! a touch press stays undetermined until the finger has moved far enough
//! along one axis. Movement along the timeline pans, movement across it
//! zooms in steps. Which physical axis is which depends on [`Orientation`].

use chrono::{DateTime, Duration, Utc};

use crate::scheduler::FragmentsSnapshot;
use crate::time_utils::{self, TimeRange};
use crate::zoom;

/// Mouse movement below this is still a click.
pub const DRAG_THRESHOLD_PX: f64 = 3.0;
/// Touch movement needed to classify a swipe as horizontal.
pub const HORIZONTAL_SWIPE_THRESHOLD_PX: f64 = 10.0;
/// Touch movement needed to classify a swipe as vertical.
pub const VERTICAL_SWIPE_THRESHOLD_PX: f64 = 20.0;
/// Accumulated cross-axis swipe distance per zoom step.
pub const ZOOM_SWIPE_DISTANCE_PX: f64 = 60.0;
/// Accumulated wheel delta per zoom step.
pub const WHEEL_DELTA_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Time runs left to right.
    Horizontal,
    /// Time runs top to bottom.
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// Pointer input in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: u32,
    pub kind: PointerKind,
    pub x: f64,
    pub y: f64,
    pub phase: PointerPhase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub x: f64,
    pub y: f64,
    pub delta_y: f64,
    pub shift_key: bool,
}

/// Hover position along the timeline axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    pub pixel: f64,
    pub time: DateTime<Utc>,
}

/// Everything the renderer and scheduler read from the view each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleState {
    pub visible_range: TimeRange,
    pub interval_index: usize,
    pub cursor: Option<CursorPosition>,
    pub is_dragging: bool,
}

/// Result of feeding one input event to the view model.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    None,
    /// Hover cursor moved or disappeared; redraw only.
    CursorMoved,
    /// Range moved during a gesture; fetch debounced.
    Panned(TimeRange),
    /// Gesture finished or zoom stepped; fetch immediately.
    Committed { range: TimeRange, zoom_index: usize },
    /// Click or tap without drag. `seek` is the nearest recorded time, if any.
    Clicked { time: DateTime<Utc>, seek: Option<DateTime<Utc>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwipeAxis {
    Undetermined,
    Pan,
    Zoom,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    id: u32,
    origin_x: f64,
    origin_y: f64,
    start_range: TimeRange,
    axis: SwipeAxis,
    has_dragged: bool,
    last_cross: f64,
    zoom_accum: f64,
}

pub struct TimelineViewModel {
    state: VisibleState,
    orientation: Orientation,
    width: f64,
    height: f64,
    press: Option<Press>,
    wheel_accum: f64,
}

impl TimelineViewModel {
    /// View of `zoom_index` width centred on `center`.
    pub fn new(center: DateTime<Utc>, zoom_index: usize, width: f64, height: f64, orientation: Orientation) -> Self {
        let zoom_index = zoom::clamp_index(zoom_index as i64);
        Self {
            state: VisibleState {
                visible_range: centered(center, zoom_index),
                interval_index: zoom_index,
                cursor: None,
                is_dragging: false,
            },
            orientation,
            width,
            height,
            press: None,
            wheel_accum: 0.0,
        }
    }

    pub fn state(&self) -> &VisibleState {
        &self.state
    }

    pub fn visible_range(&self) -> TimeRange {
        self.state.visible_range
    }

    pub fn zoom_index(&self) -> usize {
        self.state.interval_index
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn set_visible_range(&mut self, range: TimeRange) {
        self.state.visible_range = range;
    }

    /// Recenter on `t` keeping the current zoom.
    pub fn center_on(&mut self, t: DateTime<Utc>) -> TimeRange {
        self.state.visible_range = centered(t, self.state.interval_index);
        self.state.visible_range
    }

    /// Length of the time axis in pixels.
    pub fn axis_len(&self) -> f64 {
        match self.orientation {
            Orientation::Horizontal => self.width,
            Orientation::Vertical => self.height,
        }
    }

    fn along(&self, x: f64, y: f64) -> f64 {
        match self.orientation {
            Orientation::Horizontal => x,
            Orientation::Vertical => y,
        }
    }

    fn across(&self, x: f64, y: f64) -> f64 {
        match self.orientation {
            Orientation::Horizontal => y,
            Orientation::Vertical => x,
        }
    }

    pub fn pixels_per_milli(&self) -> f64 {
        let ms = self.state.visible_range.duration_ms();
        if ms <= 0 {
            return 0.0;
        }
        self.axis_len() / ms as f64
    }

    pub fn pixel_to_time(&self, px: f64) -> DateTime<Utc> {
        let ppm = self.pixels_per_milli();
        if ppm <= 0.0 {
            return self.state.visible_range.start;
        }
        self.state.visible_range.start + Duration::milliseconds((px / ppm).round() as i64)
    }

    pub fn time_to_pixel(&self, t: DateTime<Utc>) -> f64 {
        (t - self.state.visible_range.start).num_milliseconds() as f64 * self.pixels_per_milli()
    }

    /// Step to `new_index` keeping the time under `anchor_px` fixed.
    pub fn zoom_around(&mut self, new_index: usize, anchor_px: f64) -> bool {
        let old_index = self.state.interval_index;
        let new_index = zoom::clamp_index(new_index as i64);
        if new_index == old_index || self.axis_len() <= 0.0 {
            return false;
        }
        let range = self.state.visible_range;
        let ratio = (anchor_px / self.axis_len()).clamp(0.0, 1.0);
        let old_ms = range.duration_ms() as f64;
        let anchor_ms = range.start.timestamp_millis() as f64 + ratio * old_ms;
        let new_ms = old_ms * zoom::scale_ratio(old_index, new_index);
        let new_start = anchor_ms - ratio * new_ms;

        let start = time_utils::from_epoch_ms(new_start.round() as i64);
        self.state.visible_range = TimeRange::starting_at(start, Duration::milliseconds(new_ms.round() as i64));
        self.state.interval_index = new_index;
        true
    }

    /// Zoom by `steps` around the middle of the axis (buttons, keyboard).
    pub fn zoom_by(&mut self, steps: i64) -> ViewUpdate {
        let target = zoom::clamp_index(self.state.interval_index as i64 + steps);
        if self.zoom_around(target, self.axis_len() / 2.0) {
            self.committed()
        } else {
            ViewUpdate::None
        }
    }

    fn committed(&self) -> ViewUpdate {
        ViewUpdate::Committed { range: self.state.visible_range, zoom_index: self.state.interval_index }
    }

    /// Pan so that the range at gesture start moves by `delta_px` pixels.
    fn drag_to(&mut self, start_range: TimeRange, delta_px: f64) {
        let ppm = self.pixels_per_milli();
        if ppm <= 0.0 {
            return;
        }
        let delta_ms = (delta_px / ppm).round() as i64;
        self.state.visible_range = start_range.shift(Duration::milliseconds(-delta_ms));
    }

    /// Hover update from a mouse not pressing anything.
    pub fn hover(&mut self, x: f64, y: f64) -> ViewUpdate {
        let pixel = self.along(x, y);
        if pixel < 0.0 || pixel > self.axis_len() {
            return self.pointer_leave();
        }
        self.state.cursor = Some(CursorPosition { pixel, time: self.pixel_to_time(pixel) });
        ViewUpdate::CursorMoved
    }

    pub fn pointer_leave(&mut self) -> ViewUpdate {
        if self.state.cursor.take().is_some() {
            ViewUpdate::CursorMoved
        } else {
            ViewUpdate::None
        }
    }

    /// Feed a pointer event. `fragments` resolves click targets.
    pub fn pointer(&mut self, ev: PointerEvent, fragments: &FragmentsSnapshot) -> ViewUpdate {
        match ev.phase {
            PointerPhase::Start => self.press_start(ev),
            PointerPhase::Move => match self.press {
                Some(press) if press.id == ev.id => self.press_move(press, ev),
                Some(_) => ViewUpdate::None,
                None if ev.kind == PointerKind::Mouse => self.hover(ev.x, ev.y),
                None => ViewUpdate::None,
            },
            PointerPhase::End => self.press_end(ev, fragments, true),
            PointerPhase::Cancel => self.press_end(ev, fragments, false),
        }
    }

    fn press_start(&mut self, ev: PointerEvent) -> ViewUpdate {
        if self.press.is_some() {
            // Second finger; multi-touch is not a gesture here.
            return ViewUpdate::None;
        }
        let axis = match ev.kind {
            PointerKind::Mouse => SwipeAxis::Pan,
            PointerKind::Touch => SwipeAxis::Undetermined,
        };
        self.press = Some(Press {
            id: ev.id,
            origin_x: ev.x,
            origin_y: ev.y,
            start_range: self.state.visible_range,
            axis,
            has_dragged: false,
            last_cross: self.across(ev.x, ev.y),
            zoom_accum: 0.0,
        });
        ViewUpdate::None
    }

    fn press_move(&mut self, mut press: Press, ev: PointerEvent) -> ViewUpdate {
        let dx = ev.x - press.origin_x;
        let dy = ev.y - press.origin_y;

        if press.axis == SwipeAxis::Undetermined {
            let horizontal = dx.abs() > HORIZONTAL_SWIPE_THRESHOLD_PX;
            let vertical = dy.abs() > VERTICAL_SWIPE_THRESHOLD_PX;
            let along_is_x = self.orientation == Orientation::Horizontal;
            press.axis = match (horizontal, vertical) {
                (false, false) => SwipeAxis::Undetermined,
                (true, _) if along_is_x => SwipeAxis::Pan,
                (true, _) => SwipeAxis::Zoom,
                (false, true) if along_is_x => SwipeAxis::Zoom,
                (false, true) => SwipeAxis::Pan,
            };
            if press.axis == SwipeAxis::Zoom {
                press.last_cross = self.across(ev.x, ev.y);
            }
        }

        let update = match press.axis {
            SwipeAxis::Undetermined => ViewUpdate::None,
            SwipeAxis::Pan => {
                let delta = self.along(dx, dy);
                if !press.has_dragged && delta.abs() < DRAG_THRESHOLD_PX {
                    ViewUpdate::None
                } else {
                    press.has_dragged = true;
                    self.state.is_dragging = true;
                    self.state.cursor = None;
                    self.drag_to(press.start_range, delta);
                    ViewUpdate::Panned(self.state.visible_range)
                }
            }
            SwipeAxis::Zoom => {
                press.has_dragged = true;
                let cross = self.across(ev.x, ev.y);
                let step = cross - press.last_cross;
                press.last_cross = cross;
                if step.signum() != press.zoom_accum.signum() && press.zoom_accum != 0.0 {
                    press.zoom_accum = 0.0;
                }
                press.zoom_accum += step;
                if press.zoom_accum.abs() >= ZOOM_SWIPE_DISTANCE_PX {
                    // Swiping toward the axis origin zooms in.
                    let dir = if press.zoom_accum < 0.0 { -1 } else { 1 };
                    press.zoom_accum = 0.0;
                    let target = zoom::clamp_index(self.state.interval_index as i64 + dir);
                    if self.zoom_around(target, self.along(ev.x, ev.y)) {
                        self.committed()
                    } else {
                        ViewUpdate::None
                    }
                } else {
                    ViewUpdate::None
                }
            }
        };
        self.press = Some(press);
        update
    }

    fn press_end(&mut self, ev: PointerEvent, fragments: &FragmentsSnapshot, completed: bool) -> ViewUpdate {
        let Some(press) = self.press else {
            return ViewUpdate::None;
        };
        if press.id != ev.id {
            return ViewUpdate::None;
        }
        self.press = None;
        self.state.is_dragging = false;

        match (press.has_dragged, press.axis) {
            (true, SwipeAxis::Pan) => self.committed(),
            // Zoom steps were committed as they happened.
            (true, _) => ViewUpdate::None,
            (false, _) if completed => {
                let time = self.pixel_to_time(self.along(press.origin_x, press.origin_y));
                ViewUpdate::Clicked { time, seek: fragments.nearest_fragment(time) }
            }
            (false, _) => ViewUpdate::None,
        }
    }

    /// Feed a wheel event. Shift pans, otherwise accumulated delta zooms.
    pub fn wheel(&mut self, ev: WheelEvent) -> ViewUpdate {
        if ev.shift_key {
            let range = self.state.visible_range;
            self.drag_to(range, -ev.delta_y);
            return ViewUpdate::Panned(self.state.visible_range);
        }
        if ev.delta_y == 0.0 {
            return ViewUpdate::None;
        }
        if ev.delta_y.signum() != self.wheel_accum.signum() && self.wheel_accum != 0.0 {
            self.wheel_accum = 0.0;
        }
        self.wheel_accum += ev.delta_y;
        if self.wheel_accum.abs() <= WHEEL_DELTA_THRESHOLD {
            return ViewUpdate::None;
        }
        let dir = if self.wheel_accum > 0.0 { 1 } else { -1 };
        self.wheel_accum = 0.0;
        let target = zoom::clamp_index(self.state.interval_index as i64 + dir);
        if self.zoom_around(target, self.along(ev.x, ev.y)) {
            self.committed()
        } else {
            ViewUpdate::None
        }
    }
}

fn centered(center: DateTime<Utc>, zoom_index: usize) -> TimeRange {
    let len = zoom::level(zoom_index).visible();
    TimeRange::new(center - len / 2, center + len / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn mouse(phase: PointerPhase, x: f64) -> PointerEvent {
        PointerEvent { id: 1, kind: PointerKind::Mouse, x, y: 10.0, phase }
    }

    fn touch(phase: PointerPhase, x: f64, y: f64) -> PointerEvent {
        PointerEvent { id: 7, kind: PointerKind::Touch, x, y, phase }
    }

    fn empty() -> FragmentsSnapshot {
        FragmentsSnapshot::default()
    }

    #[test]
    fn mouse_drag_pans_and_commits() {
        // 1 h over 1000 px: 3.6 s per pixel.
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        let before = view.visible_range();
        view.pointer(mouse(PointerPhase::Start, 500.0), &empty());
        let update = view.pointer(mouse(PointerPhase::Move, 400.0), &empty());
        let shifted = before.shift(Duration::seconds(360));
        assert_eq!(update, ViewUpdate::Panned(shifted));
        assert!(view.state().is_dragging);

        let end = view.pointer(mouse(PointerPhase::End, 400.0), &empty());
        assert_eq!(end, ViewUpdate::Committed { range: shifted, zoom_index: 4 });
        assert!(!view.state().is_dragging);
    }

    #[test]
    fn click_without_drag_seeks_to_nearest_fragment() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        let range = view.visible_range();
        let mut bitmap = vec![0u8; 360];
        bitmap[200] = 1;
        let snapshot = FragmentsSnapshot {
            fragments: bitmap,
            buffer_range: Some(range),
            ranges: vec![],
            unit_len_secs: 10,
            is_loading: false,
        };
        view.pointer(mouse(PointerPhase::Start, 100.0), &snapshot);
        view.pointer(mouse(PointerPhase::Move, 101.0), &snapshot);
        let update = view.pointer(mouse(PointerPhase::End, 101.0), &snapshot);
        assert_eq!(
            update,
            ViewUpdate::Clicked { time: range.start + Duration::seconds(360), seek: Some(range.start + Duration::seconds(2000)) }
        );
    }

    #[test]
    fn wheel_zoom_keeps_time_under_pointer() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        let anchor = view.pixel_to_time(250.0);
        assert_eq!(view.wheel(WheelEvent { x: 250.0, y: 0.0, delta_y: 60.0, shift_key: false }), ViewUpdate::None);
        let update = view.wheel(WheelEvent { x: 250.0, y: 0.0, delta_y: 60.0, shift_key: false });
        assert!(matches!(update, ViewUpdate::Committed { zoom_index: 5, .. }));

        let range = view.visible_range();
        assert_eq!(range.duration(), Duration::hours(3));
        let anchored = range.start.timestamp_millis() as f64 + 0.25 * range.duration_ms() as f64;
        assert!((anchored - anchor.timestamp_millis() as f64).abs() <= 1.0);
    }

    #[test]
    fn wheel_direction_reversal_resets_accumulator() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        view.wheel(WheelEvent { x: 0.0, y: 0.0, delta_y: 90.0, shift_key: false });
        assert_eq!(view.wheel(WheelEvent { x: 0.0, y: 0.0, delta_y: -90.0, shift_key: false }), ViewUpdate::None);
        assert_eq!(view.zoom_index(), 4);
    }

    #[test]
    fn shift_wheel_pans() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        let before = view.visible_range();
        let update = view.wheel(WheelEvent { x: 0.0, y: 0.0, delta_y: 100.0, shift_key: true });
        assert_eq!(update, ViewUpdate::Panned(before.shift(Duration::seconds(360))));
    }

    #[test]
    fn zoom_clamps_at_ladder_ends() {
        let mut view = TimelineViewModel::new(noon(), 0, 1000.0, 40.0, Orientation::Horizontal);
        assert_eq!(view.zoom_by(-1), ViewUpdate::None);
        assert!(matches!(view.zoom_by(1), ViewUpdate::Committed { zoom_index: 1, .. }));
    }

    #[test]
    fn touch_vertical_swipe_zooms_in_horizontal_layout() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 200.0, Orientation::Horizontal);
        let before = view.visible_range();
        view.pointer(touch(PointerPhase::Start, 500.0, 150.0), &empty());
        // Within thresholds: undetermined.
        assert_eq!(view.pointer(touch(PointerPhase::Move, 505.0, 135.0), &empty()), ViewUpdate::None);
        // Vertical threshold crossed, axis becomes zoom.
        assert_eq!(view.pointer(touch(PointerPhase::Move, 505.0, 120.0), &empty()), ViewUpdate::None);
        let update = view.pointer(touch(PointerPhase::Move, 505.0, 55.0), &empty());
        assert!(matches!(update, ViewUpdate::Committed { zoom_index: 3, .. }));
        assert_eq!(view.visible_range().duration(), Duration::minutes(30));
        assert_ne!(view.visible_range(), before);
        assert_eq!(view.pointer(touch(PointerPhase::End, 505.0, 55.0), &empty()), ViewUpdate::None);
    }

    #[test]
    fn touch_pan_in_vertical_layout_uses_y() {
        let mut view = TimelineViewModel::new(noon(), 4, 200.0, 1000.0, Orientation::Vertical);
        let before = view.visible_range();
        view.pointer(touch(PointerPhase::Start, 100.0, 500.0), &empty());
        let update = view.pointer(touch(PointerPhase::Move, 102.0, 400.0), &empty());
        assert_eq!(update, ViewUpdate::Panned(before.shift(Duration::seconds(360))));
    }

    #[test]
    fn hover_tracks_cursor_and_leave_clears_it() {
        let mut view = TimelineViewModel::new(noon(), 4, 1000.0, 40.0, Orientation::Horizontal);
        assert_eq!(view.pointer(mouse(PointerPhase::Move, 500.0), &empty()), ViewUpdate::CursorMoved);
        assert_eq!(view.state().cursor.map(|c| c.time), Some(noon()));
        assert_eq!(view.pointer_leave(), ViewUpdate::CursorMoved);
        assert!(view.state().cursor.is_none());
    }
}
