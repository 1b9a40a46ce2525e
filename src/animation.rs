//! Animation loop: smooth playback indicator between progress callbacks and
//! keep the indicator on screen while playing.
//!
//! The player reports progress a few times per second at best. Every frame
//! extrapolates `progress + elapsed` from the last report so the indicator
//! moves continuously; a new report resets the baseline.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::time_utils::TimeRange;
use crate::view::TimelineViewModel;

/// Interpolated playback position for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub current_time: Option<DateTime<Utc>>,
    pub progress_secs: f64,
    /// `current_time + progress`, where the indicator is drawn.
    pub indicator: Option<DateTime<Utc>>,
}

pub struct AnimationLoop {
    current_time: Option<DateTime<Utc>>,
    progress_secs: f64,
    playing: bool,
    baseline: Instant,
    /// Whether the indicator was inside the visible range last frame.
    was_visible: Option<bool>,
}

impl AnimationLoop {
    pub fn new(now: Instant) -> Self {
        Self { current_time: None, progress_secs: 0.0, playing: false, baseline: now, was_visible: None }
    }

    /// Latest report from the player. The baseline only resets when the
    /// reported position actually changed.
    pub fn on_playback(&mut self, current_time: Option<DateTime<Utc>>, progress_secs: f64, playing: bool, now: Instant) {
        if current_time != self.current_time {
            // A new source position is a seek; allow recentering on it.
            self.was_visible = None;
        }
        if current_time != self.current_time || progress_secs != self.progress_secs {
            self.current_time = current_time;
            self.progress_secs = progress_secs;
            self.baseline = now;
        }
        if playing != self.playing {
            self.playing = playing;
            self.baseline = now;
        }
    }

    pub fn tick(&self, now: Instant) -> Frame {
        let elapsed = if self.playing {
            now.saturating_duration_since(self.baseline).as_secs_f64()
        } else {
            0.0
        };
        let progress_secs = self.progress_secs + elapsed;
        let indicator = self
            .current_time
            .map(|t| t + Duration::milliseconds((progress_secs * 1000.0).round() as i64));
        Frame { current_time: self.current_time, progress_secs, indicator }
    }

    /// Recenter the view on the indicator when it reaches an edge of the
    /// visible range. Returns the new range when the view moved.
    pub fn auto_center(&mut self, view: &mut TimelineViewModel, indicator: DateTime<Utc>) -> Option<TimeRange> {
        let range = view.visible_range();
        let inside = indicator > range.start && indicator < range.end;

        if view.state().is_dragging {
            self.was_visible = Some(inside);
            return None;
        }
        if inside || self.was_visible == Some(false) {
            self.was_visible = Some(inside);
            return None;
        }
        let centered = view.center_on(indicator);
        self.was_visible = Some(true);
        debug!(indicator = %indicator, "Timeline recentered on playback position");
        Some(centered)
    }
}

/// Call `on_frame` every `period` until `cancel` fires. Late frames are
/// skipped rather than bunched up.
pub async fn run_frame_loop<F>(period: StdDuration, cancel: CancellationToken, mut on_frame: F)
where
    F: FnMut(Instant),
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            at = interval.tick() => on_frame(at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Orientation, PointerEvent, PointerKind, PointerPhase};
    use crate::scheduler::FragmentsSnapshot;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, h, m, 0).unwrap()
    }

    #[test]
    fn interpolates_between_reports() {
        let start = Instant::now();
        let mut anim = AnimationLoop::new(start);
        anim.on_playback(Some(t(9, 0)), 10.0, true, start);

        let frame = anim.tick(start + StdDuration::from_millis(500));
        assert!((frame.progress_secs - 10.5).abs() < 1e-9);
        assert_eq!(frame.indicator, Some(t(9, 0) + Duration::milliseconds(10_500)));

        // Same report again does not reset the baseline.
        anim.on_playback(Some(t(9, 0)), 10.0, true, start + StdDuration::from_millis(700));
        assert!((anim.tick(start + StdDuration::from_secs(1)).progress_secs - 11.0).abs() < 1e-9);

        // A new report does.
        anim.on_playback(Some(t(9, 0)), 11.2, true, start + StdDuration::from_secs(1));
        assert!((anim.tick(start + StdDuration::from_millis(1250)).progress_secs - 11.45).abs() < 1e-9);
    }

    #[test]
    fn paused_playback_does_not_move() {
        let start = Instant::now();
        let mut anim = AnimationLoop::new(start);
        anim.on_playback(Some(t(9, 0)), 3.0, false, start);
        assert_eq!(anim.tick(start + StdDuration::from_secs(5)).progress_secs, 3.0);
    }

    #[test]
    fn recenters_when_indicator_reaches_edge() {
        let mut view = TimelineViewModel::new(t(12, 0), 4, 1000.0, 40.0, Orientation::Horizontal);
        let mut anim = AnimationLoop::new(Instant::now());
        assert_eq!(anim.auto_center(&mut view, t(12, 10)), None);

        let moved = anim.auto_center(&mut view, t(12, 30)).expect("recentered");
        assert_eq!(moved, TimeRange::new(t(12, 0), t(13, 0)));
        // Continuous: the next edge hit recenters again.
        assert_eq!(anim.auto_center(&mut view, t(12, 45)), None);
        assert_eq!(anim.auto_center(&mut view, t(13, 0)), Some(TimeRange::new(t(12, 30), t(13, 30))));
    }

    #[test]
    fn dragging_away_suppresses_recentering() {
        let mut view = TimelineViewModel::new(t(12, 0), 4, 1000.0, 40.0, Orientation::Horizontal);
        let mut anim = AnimationLoop::new(Instant::now());
        let snapshot = FragmentsSnapshot::default();
        let ev = |phase, x| PointerEvent { id: 1, kind: PointerKind::Mouse, x, y: 5.0, phase };
        view.pointer(ev(PointerPhase::Start, 900.0), &snapshot);
        view.pointer(ev(PointerPhase::Move, 0.0), &snapshot);
        assert_eq!(anim.auto_center(&mut view, t(12, 0)), None);
        view.pointer(ev(PointerPhase::End, 0.0), &snapshot);
        // Indicator is now off screen, but the user put it there.
        assert_eq!(anim.auto_center(&mut view, t(12, 0)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_loop_runs_until_cancelled() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let mut frames = 0u32;
        let handle = tokio::spawn(async move {
            run_frame_loop(StdDuration::from_millis(16), cancel, |_| frames += 1).await;
            frames
        });
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        stopper.cancel();
        let frames = handle.await.expect("frame loop task");
        assert!((6..=8).contains(&frames), "frames = {frames}");
    }
}
