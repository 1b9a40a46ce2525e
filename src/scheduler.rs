// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Fetch scheduler: keeps the fragment index covering the visible range plus
//! a buffer on each side, and publishes the merged bitmap for rendering.
//!
//! ```text
//! load_fragments ──debounce──┐
//! handle_timeline_change ────┼──→ run_request
//!                            │       │ 1. buffer = visible ± N screens, clamped to now
//!                            │       │ 2. publish cached data (zeros for gaps)
//!                            │       ▼
//!               plain mode:  all missing days in parallel (JoinSet)
//!            filtered mode:  missing 30-min intervals one by one, newest first,
//!                            publishing after every interval
//! ```
//!
//! Cached data is always published before any network await, so the view
//! never waits on the archive. Only a filter change (or a full cache clear)
//! cancels in-flight work; pans and zooms never do.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CameraConfig, TimelineConfig};
use crate::debounce::Debouncer;
use crate::error::{Result, TimelineError};
use crate::fragments::bitmap::fragment_ranges;
use crate::fragments::index::{CacheMode, SharedFragmentIndex};
use crate::rpc::{normalize_len, query_for_camera, ArchiveClient, TimelineFilter, TimelineKind, TimelineQuery};
use crate::time_utils::{self, Clock, SystemClock, TimeRange, INTERVAL_MS, SECOND_MS};
use crate::zoom;

/// Scheduler tuning, usually taken from [`TimelineConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Screens buffered on each side of the visible range.
    pub buffer_screens: u32,
    /// Quiet period before an interactive request runs.
    pub debounce: StdDuration,
    /// Per-request timeout; `None` waits forever.
    pub fetch_timeout: Option<StdDuration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            buffer_screens: 2,
            debounce: StdDuration::from_millis(1000),
            fetch_timeout: Some(StdDuration::from_secs(30)),
        }
    }
}

impl From<&TimelineConfig> for SchedulerSettings {
    fn from(cfg: &TimelineConfig) -> Self {
        Self {
            buffer_screens: cfg.buffer_screens,
            debounce: StdDuration::from_millis(cfg.debounce_ms),
            fetch_timeout: (cfg.fetch_timeout_secs > 0)
                .then(|| StdDuration::from_secs(cfg.fetch_timeout_secs)),
        }
    }
}

/// Whether the user may see the archive timeline at all. Shared with the
/// surrounding UI; revoked on the first authorization failure.
#[derive(Debug, Clone)]
pub struct AccessFlag(Arc<AtomicBool>);

impl AccessFlag {
    pub fn granted() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_granted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for AccessFlag {
    fn default() -> Self {
        Self::granted()
    }
}

/// What the timeline renders: the merged bitmap and everything derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentsSnapshot {
    pub fragments: Vec<u8>,
    pub buffer_range: Option<TimeRange>,
    pub ranges: Vec<TimeRange>,
    pub unit_len_secs: u32,
    pub is_loading: bool,
}

impl FragmentsSnapshot {
    /// Seek target for a click at `time`, see
    /// [`find_nearest_available_fragment`](crate::fragments::bitmap::find_nearest_available_fragment).
    pub fn nearest_fragment(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let buffer = self.buffer_range.as_ref()?;
        crate::fragments::bitmap::find_nearest_available_fragment(time, &self.fragments, buffer, self.unit_len_secs)
    }

    /// End of the recorded run playing at `time`; playback past it needs a
    /// jump to [`next_fragment_start`](Self::next_fragment_start).
    pub fn fragment_end_at(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        crate::fragments::bitmap::fragment_end_at(&self.ranges, time)
    }

    pub fn next_fragment_start(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        crate::fragments::bitmap::next_fragment_start(&self.ranges, time)
    }
}

/// The filtered fetch chain currently allowed to publish.
struct ActiveRequest {
    id: u64,
    range: TimeRange,
    zoom_index: usize,
    signature: String,
}

struct State {
    filter: Option<TimelineFilter>,
    /// Cancels every filtered fetch of the current filter generation.
    filter_generation: CancellationToken,
    /// Bumped on a full clear so late day results are dropped.
    frames_generation: u64,
    loading_days: HashSet<String>,
    loading_intervals: HashSet<i64>,
    active: Option<ActiveRequest>,
    next_request_id: u64,
    /// Last requested buffer range and zoom.
    last_view: Option<(TimeRange, usize)>,
}

impl State {
    fn is_loading(&self) -> bool {
        !self.loading_days.is_empty() || !self.loading_intervals.is_empty()
    }
}

struct Inner<C> {
    camera: CameraConfig,
    client: Arc<C>,
    index: SharedFragmentIndex,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    access: AccessFlag,
    state: Mutex<State>,
    debouncer: Debouncer,
    snapshot: watch::Sender<Arc<FragmentsSnapshot>>,
}

/// Per-camera fetch scheduler. Cheap to clone; clones share all state.
pub struct FetchScheduler<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for FetchScheduler<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: ArchiveClient> FetchScheduler<C> {
    pub fn new(
        camera: CameraConfig,
        client: Arc<C>,
        index: SharedFragmentIndex,
        settings: SchedulerSettings,
        access: AccessFlag,
    ) -> Self {
        Self::with_clock(camera, client, index, settings, access, Arc::new(SystemClock))
    }

    pub fn with_clock(
        camera: CameraConfig,
        client: Arc<C>,
        index: SharedFragmentIndex,
        settings: SchedulerSettings,
        access: AccessFlag,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(FragmentsSnapshot::default()));
        let debouncer = Debouncer::new(settings.debounce);
        Self {
            inner: Arc::new(Inner {
                camera,
                client,
                index,
                clock,
                settings,
                access,
                state: Mutex::new(State {
                    filter: None,
                    filter_generation: CancellationToken::new(),
                    frames_generation: 0,
                    loading_days: HashSet::new(),
                    loading_intervals: HashSet::new(),
                    active: None,
                    next_request_id: 0,
                    last_view: None,
                }),
                debouncer,
                snapshot,
            }),
        }
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.inner.camera
    }

    pub fn index(&self) -> &SharedFragmentIndex {
        &self.inner.index
    }

    /// Latest published fragments.
    pub fn fragments(&self) -> Arc<FragmentsSnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FragmentsSnapshot>> {
        self.inner.snapshot.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().is_loading()
    }

    pub fn has_timeline_access(&self) -> bool {
        self.inner.access.is_granted()
    }

    pub fn access(&self) -> &AccessFlag {
        &self.inner.access
    }

    pub fn filter(&self) -> Option<TimelineFilter> {
        self.inner.state.lock().filter.clone()
    }

    /// Range that gets fetched for a visible range: `buffer_screens` screens
    /// on each side, whole seconds, never past `now`.
    pub fn buffer_range(&self, visible: &TimeRange, now: DateTime<Utc>) -> TimeRange {
        let offset = self.inner.index.read().offset();
        let wide = visible.expand(visible.duration() * self.inner.settings.buffer_screens as i32);
        let start = time_utils::floor_to(wide.start, SECOND_MS, offset);
        let mut end = time_utils::ceil_to(wide.end, SECOND_MS, offset);
        let now_ceil = time_utils::ceil_to(now, SECOND_MS, offset);
        if end > now_ceil && now_ceil > start {
            end = now_ceil;
        }
        TimeRange::new(start, end)
    }

    /// Make sure the range around `[start, end)` is covered at `zoom_index`.
    ///
    /// Interactive calls (`immediate == false`) are debounced; an immediate
    /// call drops any pending one and runs to completion before returning.
    pub async fn load_fragments(&self, start: DateTime<Utc>, end: DateTime<Utc>, zoom_index: usize, immediate: bool) {
        let visible = TimeRange::new(start, end);
        if immediate {
            self.inner.debouncer.cancel();
            self.run_request(visible, zoom_index).await;
        } else {
            let this = self.clone();
            self.inner
                .debouncer
                .schedule(move || async move { this.run_request(visible, zoom_index).await });
        }
    }

    /// Commit after a gesture ends: fetch now, without debouncing.
    pub async fn handle_timeline_change(&self, start: DateTime<Utc>, end: DateTime<Utc>, zoom_index: usize) {
        self.load_fragments(start, end, zoom_index, true).await;
    }

    /// Switch the detection filter. A different signature (or turning the
    /// filter off) tears down all filtered state first.
    pub fn set_filter(&self, filter: Option<TimelineFilter>) {
        let changed = {
            let st = self.inner.state.lock();
            st.filter.as_ref().map(TimelineFilter::signature) != filter.as_ref().map(TimelineFilter::signature)
        };
        if changed {
            self.clear_motion_filter_cache();
        }
        let last_view = {
            let mut st = self.inner.state.lock();
            st.filter = filter;
            st.last_view
        };
        if changed {
            if let Some((buffer, zoom_index)) = last_view {
                self.publish(&buffer, zoom_index, self.mode());
            }
        }
    }

    /// Forget derived output. Cached days stay.
    pub fn reset_fragments(&self) {
        self.inner.debouncer.cancel();
        {
            let mut st = self.inner.state.lock();
            st.active = None;
            st.last_view = None;
        }
        self.inner.snapshot.send_replace(Arc::new(FragmentsSnapshot::default()));
        debug!(camera = self.inner.camera.id, "Fragments reset");
    }

    /// Wipe both caches and abort filtered fetches (camera switch).
    pub fn clear_frames_cache(&self) {
        self.inner.debouncer.cancel();
        self.clear_motion_filter_cache();
        {
            let mut st = self.inner.state.lock();
            st.loading_days.clear();
            st.frames_generation += 1;
            st.last_view = None;
        }
        self.inner.index.write().clear();
        self.inner.snapshot.send_replace(Arc::new(FragmentsSnapshot::default()));
        info!(camera = self.inner.camera.id, "Frames cache cleared");
    }

    /// Abort every in-flight filtered fetch and drop filtered results.
    pub fn clear_motion_filter_cache(&self) {
        let aborted = {
            let mut st = self.inner.state.lock();
            st.filter_generation.cancel();
            st.filter_generation = CancellationToken::new();
            let aborted = st.loading_intervals.len();
            st.loading_intervals.clear();
            st.active = None;
            aborted
        };
        self.inner.index.write().clear_intervals();
        info!(camera = self.inner.camera.id, aborted, "Filtered timeline cache cleared");
    }

    fn mode(&self) -> CacheMode {
        if self.inner.state.lock().filter.is_some() {
            CacheMode::Filtered
        } else {
            CacheMode::Plain
        }
    }

    async fn run_request(&self, visible: TimeRange, zoom_index: usize) {
        if !self.inner.access.is_granted() {
            debug!(camera = self.inner.camera.id, "Timeline access revoked, skipping request");
            return;
        }
        let zoom_index = zoom::clamp_index(zoom_index as i64);
        let now = self.inner.clock.now();
        let buffer = self.buffer_range(&visible, now);

        let filter = {
            let mut st = self.inner.state.lock();
            st.last_view = Some((buffer, zoom_index));
            st.filter.clone()
        };

        match filter {
            None => self.fetch_days(buffer, zoom_index, now).await,
            Some(filter) => self.fetch_intervals(buffer, zoom_index, filter, now).await,
        }
    }

    // ──────────────── plain mode ───────────────────────────────────────────

    async fn fetch_days(&self, buffer: TimeRange, zoom_index: usize, now: DateTime<Utc>) {
        let missing = self.inner.index.read().missing_days(&buffer, now);
        let offset = self.inner.index.read().offset();

        let (to_fetch, generation) = {
            let mut st = self.inner.state.lock();
            let to_fetch: Vec<(DateTime<Utc>, String)> = missing
                .into_iter()
                .map(|day| (day, time_utils::day_key(day, offset)))
                .filter(|(_, key)| st.loading_days.insert(key.clone()))
                .collect();
            (to_fetch, st.frames_generation)
        };

        self.publish(&buffer, zoom_index, CacheMode::Plain);
        if to_fetch.is_empty() {
            return;
        }

        debug!(camera = self.inner.camera.id, days = to_fetch.len(), "Fetching missing days");
        let mut set = JoinSet::new();
        for (day, key) in to_fetch {
            let this = self.clone();
            set.spawn(async move { this.fetch_day(day, key, generation, now).await });
        }
        while set.join_next().await.is_some() {}

        self.publish_latest(CacheMode::Plain);
    }

    async fn fetch_day(&self, day: DateTime<Utc>, key: String, generation: u64, now: DateTime<Utc>) {
        let offset = self.inner.index.read().offset();
        let end = time_utils::end_of_day(day, offset).min(time_utils::floor_to(now, SECOND_MS, offset));
        let query = query_for_camera(&self.inner.camera, TimelineKind::Frames, day, end, None);
        let expected = query.expected_len();

        let result = self.call(query, None).await;

        let current = {
            let mut st = self.inner.state.lock();
            let current = st.frames_generation == generation;
            if current {
                st.loading_days.remove(&key);
            }
            current
        };
        if !current {
            debug!(camera = self.inner.camera.id, day = key, "Dropping day fetched before cache clear");
            return;
        }

        match result {
            Ok(bitmap) => {
                self.inner.index.write().record_day(&key, normalize_len(bitmap, expected));
                debug!(camera = self.inner.camera.id, day = key, "Day timeline cached");
            }
            Err(e) => self.handle_error(e, &key),
        }
    }

    // ──────────────── filtered mode ────────────────────────────────────────

    async fn fetch_intervals(&self, buffer: TimeRange, zoom_index: usize, filter: TimelineFilter, now: DateTime<Utc>) {
        let signature = filter.signature();
        if self.inner.index.write().ensure_interval_signature(&signature) {
            debug!(camera = self.inner.camera.id, "Interval cache held another filter, wiped");
        }

        let claimed = {
            let mut st = self.inner.state.lock();
            let overlapping = st
                .active
                .as_ref()
                .filter(|a| a.signature == signature && a.range.overlaps(&buffer));
            match overlapping {
                Some(active) => {
                    if active.zoom_index != zoom_index {
                        debug!(
                            camera = self.inner.camera.id,
                            from = active.zoom_index,
                            to = zoom_index,
                            "Zoom changed during filtered fetch, re-rendering cached data"
                        );
                    }
                    None
                }
                None => {
                    let id = st.next_request_id;
                    st.next_request_id += 1;
                    st.active = Some(ActiveRequest { id, range: buffer, zoom_index, signature: signature.clone() });
                    Some((id, st.filter_generation.child_token()))
                }
            }
        };

        self.publish(&buffer, zoom_index, CacheMode::Filtered);
        let Some((id, token)) = claimed else {
            return;
        };

        let missing = self.inner.index.read().missing_intervals(&buffer, now);
        if !missing.is_empty() {
            debug!(camera = self.inner.camera.id, intervals = missing.len(), "Fetching missing intervals");
        }

        // Newest first so data appears from "now" backwards.
        for key in missing.into_iter().rev() {
            if token.is_cancelled() || !self.inner.access.is_granted() {
                break;
            }
            if !self.inner.state.lock().loading_intervals.insert(key) {
                continue;
            }
            self.fetch_interval(key, &filter, &signature, &token, now).await;
            if token.is_cancelled() {
                break;
            }
            if self.is_active(id) {
                self.publish_latest(CacheMode::Filtered);
            }
        }

        if token.is_cancelled() {
            debug!(camera = self.inner.camera.id, "Filtered fetch chain cancelled");
            return;
        }
        let still_active = {
            let mut st = self.inner.state.lock();
            let active = st.active.as_ref().is_some_and(|a| a.id == id);
            if active {
                st.active = None;
            }
            active
        };
        if still_active {
            self.publish_latest(CacheMode::Filtered);
        }
    }

    async fn fetch_interval(
        &self,
        key: i64,
        filter: &TimelineFilter,
        signature: &str,
        token: &CancellationToken,
        now: DateTime<Utc>,
    ) {
        let offset = self.inner.index.read().offset();
        let start = time_utils::from_epoch_ms(key);
        let end = (start + Duration::milliseconds(INTERVAL_MS - SECOND_MS))
            .min(time_utils::floor_to(now, SECOND_MS, offset));
        let query = query_for_camera(&self.inner.camera, filter.kind(), start, end, Some(filter));
        let expected = query.expected_len();

        let result = self.call(query, Some(token)).await;

        // A cancelled chain's keys were already cleared by the canceller, and
        // the next generation may have claimed the same key since.
        if token.is_cancelled() {
            return;
        }
        self.inner.state.lock().loading_intervals.remove(&key);

        match result {
            Ok(bitmap) => {
                let mut index = self.inner.index.write();
                if index.interval_signature() == Some(signature) {
                    index.record_interval(key, normalize_len(bitmap, expected));
                    debug!(camera = self.inner.camera.id, interval = key, "Interval timeline cached");
                }
            }
            Err(e) => self.handle_error(e, &key.to_string()),
        }
    }

    fn is_active(&self, id: u64) -> bool {
        self.inner.state.lock().active.as_ref().is_some_and(|a| a.id == id)
    }

    // ──────────────── shared ───────────────────────────────────────────────

    async fn call(&self, query: TimelineQuery, token: Option<&CancellationToken>) -> Result<Vec<u8>> {
        let timeout = self.inner.settings.fetch_timeout;
        let request = async {
            let fut = self.inner.client.get_timeline(query);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(TimelineError::Timeout { secs: limit.as_secs() }),
                },
                None => fut.await,
            }
        };
        match token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TimelineError::Cancelled),
                res = request => res,
            },
            None => request.await,
        }
    }

    fn handle_error(&self, e: TimelineError, key: &str) {
        if e.is_cancelled() {
            debug!(camera = self.inner.camera.id, key, "Timeline fetch cancelled");
        } else if e.is_forbidden() {
            self.inner.access.revoke();
            warn!(camera = self.inner.camera.id, key, "Archive access forbidden, timeline disabled");
        } else {
            warn!(camera = self.inner.camera.id, key, error = %e, "Timeline fetch failed, will retry on next request");
        }
    }

    /// Publish with the most recently requested view, if the mode still matches.
    fn publish_latest(&self, mode: CacheMode) {
        let last_view = self.inner.state.lock().last_view;
        if let Some((buffer, zoom_index)) = last_view {
            if self.mode() == mode {
                self.publish(&buffer, zoom_index, mode);
            }
        }
    }

    fn publish(&self, buffer: &TimeRange, zoom_index: usize, mode: CacheMode) {
        let unit = zoom::level(zoom_index).unit_len_secs;
        let merged = self.inner.index.read().merge_for_range(buffer, unit, mode);
        let ranges = fragment_ranges(&merged.timeline, &merged.buffer_range, unit);
        let is_loading = self.inner.state.lock().is_loading();
        self.inner.snapshot.send_replace(Arc::new(FragmentsSnapshot {
            fragments: merged.timeline,
            buffer_range: Some(merged.buffer_range),
            ranges,
            unit_len_secs: unit,
            is_loading,
        }));
    }
}
