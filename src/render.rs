//! Canvas renderer: stateless draw functions for one timeline frame.
//!
//! Layers, back to front:
//!
//! ```text
//! background → day/hour/sub-interval markers → fragment bar
//!            → current-time indicator → hover cursor → hover preview
//! ```
//!
//! Everything is laid out along the time axis ("along") and across it
//! ("cross"), so the same code draws horizontal and vertical timelines.

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::time_utils::{self, TimeRange};
use crate::view::{CursorPosition, Orientation};
use crate::zoom::{self, MARKER_LADDER_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Drawing backend. Coordinates are canvas pixels, origin top-left.
pub trait Canvas {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color);
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: Color, width: f64, dash: Option<&[f64]>);
    /// Text with its top-left corner at `(x, y)`.
    fn text(&mut self, text: &str, x: f64, y: f64, color: Color, font_px: f64);
    fn measure_text(&self, text: &str, font_px: f64) -> f64;
    fn draw_image(&mut self, image: &str, x: f64, y: f64, w: f64, h: f64);
}

/// Colours and sizes.
#[derive(Debug, Clone)]
pub struct Theme {
    pub background: Color,
    pub baseline: Color,
    pub fragment: Color,
    pub day_marker: Color,
    pub hour_marker: Color,
    pub sub_marker: Color,
    pub label: Color,
    pub indicator: Color,
    pub cursor: Color,
    pub cursor_label_bg: Color,
    pub cursor_label: Color,
    pub font_px: f64,
    pub bar_thickness: f64,
    pub hour_tick: f64,
    pub sub_tick: f64,
    pub min_marker_spacing_px: f64,
    pub label_padding: f64,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::rgb(0x1e, 0x1f, 0x22),
            baseline: Color::rgb(0x55, 0x58, 0x5e),
            fragment: Color::rgb(0x3c, 0xb3, 0x71),
            day_marker: Color::rgb(0xe0, 0xe0, 0xe0),
            hour_marker: Color::rgb(0xa0, 0xa0, 0xa0),
            sub_marker: Color::rgb(0x70, 0x70, 0x70),
            label: Color::rgb(0xc8, 0xc8, 0xc8),
            indicator: Color::rgb(0xe5, 0x39, 0x35),
            cursor: Color::rgba(0xff, 0xff, 0xff, 0xb0),
            cursor_label_bg: Color::rgba(0x00, 0x00, 0x00, 0xc0),
            cursor_label: Color::rgb(0xff, 0xff, 0xff),
            font_px: 10.0,
            bar_thickness: 8.0,
            hour_tick: 12.0,
            sub_tick: 6.0,
            min_marker_spacing_px: 60.0,
            label_padding: 4.0,
        }
    }
}

/// Thumbnail shown next to the hover cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub image: String,
    pub width: f64,
    pub height: f64,
}

/// Full input of one frame.
#[derive(Debug, Clone)]
pub struct FrameState<'a> {
    pub visible: TimeRange,
    pub zoom_index: usize,
    pub orientation: Orientation,
    pub offset: FixedOffset,
    pub fragments: &'a [u8],
    pub buffer_range: Option<TimeRange>,
    pub unit_len_secs: u32,
    pub current_time: Option<DateTime<Utc>>,
    /// Seconds played since `current_time`.
    pub progress_secs: f64,
    pub cursor: Option<CursorPosition>,
    pub preview: Option<&'a PreviewFrame>,
}

/// Maps along/cross coordinates onto canvas x/y.
#[derive(Debug, Clone, Copy)]
pub struct Axis {
    pub orientation: Orientation,
    pub along_len: f64,
    pub cross_len: f64,
}

impl Axis {
    pub fn new<C: Canvas + ?Sized>(canvas: &C, orientation: Orientation) -> Self {
        let (along_len, cross_len) = match orientation {
            Orientation::Horizontal => (canvas.width(), canvas.height()),
            Orientation::Vertical => (canvas.height(), canvas.width()),
        };
        Self { orientation, along_len, cross_len }
    }

    pub fn point(&self, along: f64, cross: f64) -> (f64, f64) {
        match self.orientation {
            Orientation::Horizontal => (along, cross),
            Orientation::Vertical => (cross, along),
        }
    }

    pub fn rect(&self, along: f64, cross: f64, along_size: f64, cross_size: f64) -> (f64, f64, f64, f64) {
        match self.orientation {
            Orientation::Horizontal => (along, cross, along_size, cross_size),
            Orientation::Vertical => (cross, along, cross_size, along_size),
        }
    }

    fn fill(&self, canvas: &mut (impl Canvas + ?Sized), along: f64, cross: f64, a: f64, c: f64, color: Color) {
        let (x, y, w, h) = self.rect(along, cross, a, c);
        canvas.fill_rect(x, y, w, h, color);
    }

    /// Line across the axis at `along`, from `cross_from` to `cross_to`.
    fn cross_line(
        &self,
        canvas: &mut (impl Canvas + ?Sized),
        along: f64,
        cross_from: f64,
        cross_to: f64,
        color: Color,
        width: f64,
        dash: Option<&[f64]>,
    ) {
        let (x1, y1) = self.point(along, cross_from);
        let (x2, y2) = self.point(along, cross_to);
        canvas.line(x1, y1, x2, y2, color, width, dash);
    }
}

/// Pixel position of `t` along the axis.
fn along_px(t: DateTime<Utc>, visible: &TimeRange, axis: &Axis) -> f64 {
    let ms = visible.duration_ms();
    if ms <= 0 {
        return 0.0;
    }
    (t - visible.start).num_milliseconds() as f64 * axis.along_len / ms as f64
}

pub fn draw_background(canvas: &mut (impl Canvas + ?Sized), theme: &Theme) {
    let (w, h) = (canvas.width(), canvas.height());
    canvas.fill_rect(0.0, 0.0, w, h, theme.background);
}

/// Marker spacing for the current zoom, escalated along the ladder until
/// the markers fit `min_spacing_px` apart.
pub fn marker_step_ms(visible_ms: i64, zoom_index: usize, along_len: f64, min_spacing_px: f64) -> i64 {
    let base = zoom::level(zoom_index).marker_step_ms;
    let max_markers = (along_len / min_spacing_px).floor().max(1.0) as i64;
    let mut rung = MARKER_LADDER_MS
        .iter()
        .position(|&s| s >= base)
        .unwrap_or(MARKER_LADDER_MS.len() - 1);
    while visible_ms / MARKER_LADDER_MS[rung] > max_markers && rung + 1 < MARKER_LADDER_MS.len() {
        rung += 1;
    }
    MARKER_LADDER_MS[rung]
}

/// Kind of marker a boundary gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Day,
    Hour,
    Sub,
}

/// Marker positions and kinds in `visible` at `step_ms`.
pub fn markers(visible: &TimeRange, step_ms: i64, offset: FixedOffset) -> Vec<(DateTime<Utc>, MarkerKind)> {
    let mut out = Vec::new();
    let mut t = time_utils::ceil_to(visible.start, step_ms, offset);
    while t <= visible.end {
        let kind = if time_utils::is_start_of_day(t, offset) {
            MarkerKind::Day
        } else if time_utils::is_start_of_hour(t, offset) {
            MarkerKind::Hour
        } else {
            MarkerKind::Sub
        };
        out.push((t, kind));
        t += Duration::milliseconds(step_ms);
    }
    out
}

pub fn draw_markers(canvas: &mut (impl Canvas + ?Sized), frame: &FrameState<'_>, axis: &Axis, theme: &Theme) {
    let step = marker_step_ms(frame.visible.duration_ms(), frame.zoom_index, axis.along_len, theme.min_marker_spacing_px);
    let bar_top = axis.cross_len - theme.bar_thickness;

    for (t, kind) in markers(&frame.visible, step, frame.offset) {
        let p = along_px(t, &frame.visible, axis).round() + 0.5;
        let (color, tick, label) = match kind {
            MarkerKind::Day => (theme.day_marker, bar_top, time_utils::format_date_label(t, frame.offset)),
            MarkerKind::Hour => (theme.hour_marker, theme.hour_tick, time_utils::format_time_label(t, frame.offset)),
            MarkerKind::Sub => (theme.sub_marker, theme.sub_tick, time_utils::format_time_label(t, frame.offset)),
        };
        axis.cross_line(canvas, p, 0.0, tick, color, 1.0, None);
        let (x, y) = axis.point(p + theme.label_padding / 2.0, tick.min(theme.hour_tick) + 2.0);
        canvas.text(&label, x, y, theme.label, theme.font_px);
    }
}

/// Gray baseline across the whole axis, then green where units have video.
pub fn draw_fragments(
    canvas: &mut (impl Canvas + ?Sized),
    visible: &TimeRange,
    fragments: &[u8],
    buffer: Option<&TimeRange>,
    unit_len_secs: u32,
    axis: &Axis,
    theme: &Theme,
) {
    let cross = axis.cross_len - theme.bar_thickness;
    axis.fill(canvas, 0.0, cross, axis.along_len, theme.bar_thickness, theme.baseline);

    let Some(buffer) = buffer else {
        return;
    };
    let unit = Duration::seconds(unit_len_secs.max(1) as i64);
    let mut i = 0;
    while i < fragments.len() {
        if fragments[i] == 0 {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < fragments.len() && fragments[i] > 0 {
            i += 1;
        }
        let from = along_px(buffer.start + unit * run_start as i32, visible, axis);
        let to = along_px(buffer.start + unit * i as i32, visible, axis);
        let from = from.max(0.0);
        let to = to.min(axis.along_len);
        if to > from {
            axis.fill(canvas, from, cross, to - from, theme.bar_thickness, theme.fragment);
        }
    }
}

/// Playback position: `current_time + progress`, drawn only while visible.
pub fn draw_current_time(
    canvas: &mut (impl Canvas + ?Sized),
    visible: &TimeRange,
    current_time: DateTime<Utc>,
    progress_secs: f64,
    axis: &Axis,
    theme: &Theme,
) -> bool {
    let t = current_time + Duration::milliseconds((progress_secs * 1000.0).round() as i64);
    if t < visible.start || t > visible.end {
        return false;
    }
    let p = along_px(t, visible, axis);
    axis.cross_line(canvas, p, 0.0, axis.cross_len, theme.indicator, 2.0, None);
    axis.fill(canvas, p - 3.0, 0.0, 6.0, 4.0, theme.indicator);
    true
}

/// Where a box of `size` sits next to `pos` without leaving `[0, len]`:
/// after the position by default, flipped before it when that overflows.
pub fn label_position(pos: f64, size: f64, gap: f64, len: f64) -> f64 {
    let after = pos + gap;
    if after + size <= len {
        return after;
    }
    (pos - gap - size).max(0.0)
}

pub fn draw_cursor(
    canvas: &mut (impl Canvas + ?Sized),
    cursor: &CursorPosition,
    offset: FixedOffset,
    axis: &Axis,
    theme: &Theme,
) {
    axis.cross_line(canvas, cursor.pixel, 0.0, axis.cross_len, theme.cursor, 1.0, Some(&[4.0, 3.0]));

    let label = time_utils::format_cursor_label(cursor.time, offset);
    let pad = theme.label_padding;
    let text_w = canvas.measure_text(&label, theme.font_px);
    let (box_along, box_cross) = match axis.orientation {
        Orientation::Horizontal => (text_w + 2.0 * pad, theme.font_px + 2.0 * pad),
        Orientation::Vertical => (theme.font_px + 2.0 * pad, text_w + 2.0 * pad),
    };
    let along = label_position(cursor.pixel, box_along, 4.0, axis.along_len);
    axis.fill(canvas, along, 0.0, box_along, box_cross, theme.cursor_label_bg);
    let (x, y) = axis.point(along + pad, pad);
    canvas.text(&label, x, y, theme.cursor_label, theme.font_px);
}

/// Thumbnail of the frame under the cursor, kept inside the canvas.
pub fn draw_preview(canvas: &mut (impl Canvas + ?Sized), cursor: &CursorPosition, preview: &PreviewFrame, axis: &Axis) {
    let (along_size, cross_size) = match axis.orientation {
        Orientation::Horizontal => (preview.width, preview.height),
        Orientation::Vertical => (preview.height, preview.width),
    };
    let along = (cursor.pixel - along_size / 2.0).clamp(0.0, (axis.along_len - along_size).max(0.0));
    let cross = (axis.cross_len - cross_size).max(0.0) / 2.0;
    let (x, y, w, h) = axis.rect(along, cross, along_size, cross_size);
    canvas.draw_image(&preview.image, x, y, w, h);
}

/// Draw a whole frame.
pub fn render_frame(canvas: &mut (impl Canvas + ?Sized), frame: &FrameState<'_>, theme: &Theme) {
    let axis = Axis::new(&*canvas, frame.orientation);
    draw_background(canvas, theme);
    draw_markers(canvas, frame, &axis, theme);
    draw_fragments(
        canvas,
        &frame.visible,
        frame.fragments,
        frame.buffer_range.as_ref(),
        frame.unit_len_secs,
        &axis,
        theme,
    );
    if let Some(current) = frame.current_time {
        draw_current_time(canvas, &frame.visible, current, frame.progress_secs, &axis, theme);
    }
    if let Some(cursor) = &frame.cursor {
        draw_cursor(canvas, cursor, frame.offset, &axis, theme);
        if let Some(preview) = frame.preview {
            draw_preview(canvas, cursor, preview, &axis);
        }
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect { x: f64, y: f64, w: f64, h: f64, color: Color },
    Line { x1: f64, y1: f64, x2: f64, y2: f64, color: Color, width: f64, dashed: bool },
    Text { text: String, x: f64, y: f64, color: Color },
    Image { image: String, x: f64, y: f64, w: f64, h: f64 },
}

/// Canvas that records draw calls instead of rasterizing them.
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    width: f64,
    height: f64,
    pub commands: Vec<DrawCommand>,
}

impl RecordingCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, commands: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn rects_with(&self, color: Color) -> Vec<(f64, f64, f64, f64)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Rect { x, y, w, h, color: c } if *c == color => Some((*x, *y, *w, *h)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.commands.push(DrawCommand::Rect { x, y, w, h, color });
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: Color, width: f64, dash: Option<&[f64]>) {
        self.commands.push(DrawCommand::Line { x1, y1, x2, y2, color, width, dashed: dash.is_some() });
    }

    fn text(&mut self, text: &str, x: f64, y: f64, color: Color, _font_px: f64) {
        self.commands.push(DrawCommand::Text { text: text.to_string(), x, y, color });
    }

    fn measure_text(&self, text: &str, font_px: f64) -> f64 {
        text.chars().count() as f64 * font_px * 0.6
    }

    fn draw_image(&mut self, image: &str, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::Image { image: image.to_string(), x, y, w, h });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, h, m, 0).unwrap()
    }

    fn frame<'a>(visible: TimeRange, fragments: &'a [u8], buffer: Option<TimeRange>) -> FrameState<'a> {
        FrameState {
            visible,
            zoom_index: 4,
            orientation: Orientation::Horizontal,
            offset: utc(),
            fragments,
            buffer_range: buffer,
            unit_len_secs: 600,
            current_time: None,
            progress_secs: 0.0,
            cursor: None,
            preview: None,
        }
    }

    #[test]
    fn fragments_draw_baseline_first_and_clip() {
        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(600.0, 40.0);
        // Visible 10:00-11:00, buffer 09:40-11:20 in 10-minute units.
        let visible = TimeRange::new(at(10, 0), at(11, 0));
        let buffer = TimeRange::new(at(9, 40), at(11, 20));
        let bits = [1, 1, 0, 0, 1, 0, 0, 0, 1, 1];
        let axis = Axis::new(&canvas, Orientation::Horizontal);
        draw_fragments(&mut canvas, &visible, &bits, Some(&buffer), 600, &axis, &theme);

        assert_eq!(canvas.commands[0], DrawCommand::Rect { x: 0.0, y: 32.0, w: 600.0, h: 8.0, color: theme.baseline });
        let green = canvas.rects_with(theme.fragment);
        // Runs entirely before and after the visible range are clipped away.
        assert_eq!(green, vec![(200.0, 32.0, 100.0, 8.0)]);
    }

    #[test]
    fn run_crossing_edge_is_clipped() {
        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(600.0, 40.0);
        let visible = TimeRange::new(at(10, 0), at(11, 0));
        let buffer = TimeRange::new(at(9, 50), at(11, 10));
        let bits = [1, 1, 0, 0, 0, 0, 1, 1];
        let axis = Axis::new(&canvas, Orientation::Horizontal);
        draw_fragments(&mut canvas, &visible, &bits, Some(&buffer), 600, &axis, &theme);
        assert_eq!(
            canvas.rects_with(theme.fragment),
            vec![(0.0, 32.0, 100.0, 8.0), (500.0, 32.0, 100.0, 8.0)]
        );
    }

    #[test]
    fn indicator_only_inside_visible_range() {
        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(600.0, 40.0);
        let visible = TimeRange::new(at(10, 0), at(11, 0));
        let axis = Axis::new(&canvas, Orientation::Horizontal);
        assert!(draw_current_time(&mut canvas, &visible, at(10, 30), 30.0, &axis, &theme));
        match &canvas.commands[0] {
            DrawCommand::Line { x1, .. } => assert!((x1 - 305.0).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        canvas.clear();
        assert!(!draw_current_time(&mut canvas, &visible, at(11, 0), 1.0, &axis, &theme));
        assert!(canvas.commands.is_empty());
    }

    #[test]
    fn cursor_label_flips_near_edge() {
        assert_eq!(label_position(100.0, 50.0, 4.0, 600.0), 104.0);
        assert_eq!(label_position(580.0, 50.0, 4.0, 600.0), 526.0);
        assert_eq!(label_position(20.0, 50.0, 4.0, 60.0), 0.0);

        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(600.0, 40.0);
        let axis = Axis::new(&canvas, Orientation::Horizontal);
        let cursor = CursorPosition { pixel: 590.0, time: at(10, 59) };
        draw_cursor(&mut canvas, &cursor, utc(), &axis, &theme);
        assert!(matches!(canvas.commands[0], DrawCommand::Line { dashed: true, .. }));
        let boxes = canvas.rects_with(theme.cursor_label_bg);
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].0 + boxes[0].2 <= 600.0);
        assert!(canvas.texts().contains(&"01.07.2026 10:59:00"));
    }

    #[test]
    fn marker_density_escalates() {
        // 1 h at 10-minute base markers fits 600 px.
        assert_eq!(marker_step_ms(3_600_000, 4, 600.0, 60.0), 600_000);
        // The same hour squeezed into 120 px allows 2 markers: 30 min.
        assert_eq!(marker_step_ms(3_600_000, 4, 120.0, 60.0), 1_800_000);
        // 24 h never escalates past the last rung.
        assert_eq!(marker_step_ms(86_400_000, 8, 60.0, 60.0), 3 * 3_600_000);
    }

    #[test]
    fn markers_classify_boundaries() {
        let visible = TimeRange::new(Utc.with_ymd_and_hms(2026, 7, 1, 23, 0, 0).unwrap(), Utc.with_ymd_and_hms(2026, 7, 2, 0, 30, 0).unwrap());
        let found = markers(&visible, 1_800_000, utc());
        let kinds: Vec<MarkerKind> = found.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, vec![MarkerKind::Hour, MarkerKind::Sub, MarkerKind::Day, MarkerKind::Sub]);
    }

    #[test]
    fn full_frame_renders_layers_in_order() {
        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(600.0, 40.0);
        let visible = TimeRange::new(at(10, 0), at(11, 0));
        let bits = [0, 1, 0, 0, 0, 0];
        let preview = PreviewFrame { image: "thumb-1".into(), width: 80.0, height: 30.0 };
        let mut state = frame(visible, &bits, Some(visible));
        state.current_time = Some(at(10, 20));
        state.cursor = Some(CursorPosition { pixel: 300.0, time: at(10, 30) });
        state.preview = Some(&preview);
        render_frame(&mut canvas, &state, &theme);

        assert_eq!(canvas.commands[0], DrawCommand::Rect { x: 0.0, y: 0.0, w: 600.0, h: 40.0, color: theme.background });
        assert!(canvas.texts().contains(&"10:10"));
        assert_eq!(canvas.rects_with(theme.fragment), vec![(100.0, 32.0, 100.0, 8.0)]);
        assert!(matches!(canvas.commands.last(), Some(DrawCommand::Image { image, .. }) if image == "thumb-1"));
    }

    #[test]
    fn vertical_layout_swaps_axes() {
        let theme = Theme::default();
        let mut canvas = RecordingCanvas::new(40.0, 600.0);
        let visible = TimeRange::new(at(10, 0), at(11, 0));
        let axis = Axis::new(&canvas, Orientation::Vertical);
        draw_fragments(&mut canvas, &visible, &[0, 0, 1, 0, 0, 0], Some(&visible), 600, &axis, &theme);
        assert_eq!(canvas.rects_with(theme.fragment), vec![(32.0, 200.0, 8.0, 100.0)]);
    }
}
