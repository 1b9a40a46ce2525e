// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Timeline manager: owns the fragment cache registry and one fetch
//! scheduler per mounted camera.
//!
//! Caches outlive mounts. Unmounting a view keeps its cache; only
//! `switch_camera()` (clears) and `remove_camera()` (disposes) drop data.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use crate::config::{CameraConfig, Config};
use crate::error::Result;
use crate::fragments::registry::{CameraKey, FragmentCacheRegistry};
use crate::rpc::{ArchiveClient, HttpArchiveClient};
use crate::scheduler::{AccessFlag, FetchScheduler, SchedulerSettings};
use crate::time_utils::{Clock, SystemClock};

/// Top-level session object.
pub struct TimelineManager<C: ArchiveClient = HttpArchiveClient> {
    config: Config,
    client: Arc<C>,
    registry: FragmentCacheRegistry,
    /// Shared by every scheduler; one forbidden response hides all timelines.
    access: AccessFlag,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    /// Mounted schedulers, keyed by camera ID.
    schedulers: HashMap<String, FetchScheduler<C>>,
}

impl TimelineManager<HttpArchiveClient> {
    /// Create the manager from a validated [`Config`], talking HTTP to the
    /// configured archive server.
    pub fn new(config: Config) -> Result<Self> {
        let offset = config.timeline.offset()?;
        let client = HttpArchiveClient::new(&config.server, offset)?;
        info!(url = client.url(), cameras = config.cameras.len(), "Archive client ready");
        Self::with_client(config, Arc::new(client), Arc::new(SystemClock))
    }
}

impl<C: ArchiveClient> TimelineManager<C> {
    pub fn with_client(config: Config, client: Arc<C>, clock: Arc<dyn Clock>) -> Result<Self> {
        let offset = config.timeline.offset()?;
        let live_refresh = (config.timeline.live_refresh_secs > 0)
            .then(|| Duration::seconds(config.timeline.live_refresh_secs as i64));
        let settings = SchedulerSettings::from(&config.timeline);
        Ok(Self {
            registry: FragmentCacheRegistry::new(offset, live_refresh),
            access: AccessFlag::granted(),
            schedulers: HashMap::new(),
            config,
            client,
            clock,
            settings,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &FragmentCacheRegistry {
        &self.registry
    }

    pub fn access(&self) -> &AccessFlag {
        &self.access
    }

    fn key(&self, camera_id: &str) -> CameraKey {
        CameraKey::new(camera_id, &self.config.server.host, self.config.server.port)
    }

    /// Scheduler for `camera_id`, bound to the camera's (possibly already
    /// populated) cache. Mounting twice returns the same scheduler.
    pub fn mount(&mut self, camera_id: &str) -> Result<FetchScheduler<C>> {
        if let Some(existing) = self.schedulers.get(camera_id) {
            return Ok(existing.clone());
        }
        let camera = self.config.camera(camera_id)?.clone();
        let index = self.registry.get_or_create(&self.key(camera_id));
        let cached_days = index.read().day_count();
        let scheduler = FetchScheduler::with_clock(
            camera,
            self.client.clone(),
            index,
            self.settings.clone(),
            self.access.clone(),
            self.clock.clone(),
        );
        info!(camera = camera_id, cached_days, "Timeline mounted");
        self.schedulers.insert(camera_id.to_string(), scheduler.clone());
        Ok(scheduler)
    }

    /// Drop the scheduler for `camera_id` but keep its cache for a later
    /// remount.
    pub fn unmount(&mut self, camera_id: &str) -> bool {
        match self.schedulers.remove(camera_id) {
            Some(scheduler) => {
                scheduler.reset_fragments();
                info!(camera = camera_id, "Timeline unmounted");
                true
            }
            None => false,
        }
    }

    /// The player moved from `from` to `to`: the old camera's caches are
    /// wiped and the new camera is mounted.
    pub fn switch_camera(&mut self, from: &str, to: &str) -> Result<FetchScheduler<C>> {
        if let Some(old) = self.schedulers.remove(from) {
            old.clear_frames_cache();
        } else if let Some(index) = self.registry.get(&self.key(from)) {
            index.write().clear();
        }
        info!(from, to, "Camera switched");
        self.mount(to)
    }

    /// Camera removed permanently: unmount it and dispose its cache.
    pub fn remove_camera(&mut self, camera_id: &str) -> bool {
        if let Some(scheduler) = self.schedulers.remove(camera_id) {
            scheduler.clear_frames_cache();
        }
        if self.registry.dispose(&self.key(camera_id)) {
            info!(camera = camera_id, "Camera removed");
            true
        } else {
            warn!(camera = camera_id, "Camera not found for removal");
            false
        }
    }

    /// Configured cameras.
    pub fn list_cameras(&self) -> Vec<&CameraConfig> {
        self.config.cameras.iter().collect()
    }

    /// IDs of cameras with a mounted scheduler.
    pub fn mounted(&self) -> Vec<&str> {
        self.schedulers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::TimelineQuery;

    struct EmptyArchive;

    impl ArchiveClient for EmptyArchive {
        async fn get_timeline(&self, query: TimelineQuery) -> Result<Vec<u8>> {
            Ok(vec![0; query.expected_len()])
        }
    }

    fn manager() -> TimelineManager<EmptyArchive> {
        let config = Config::from_toml(
            r#"
            [server]
            host = "10.0.0.5"

            [timeline]
            utc_offset_minutes = 0

            [[cameras]]
            id = "cam1"
            name = "Front"

            [[cameras]]
            id = "cam2"
            name = "Back"
            "#,
        )
        .unwrap();
        TimelineManager::with_client(config, Arc::new(EmptyArchive), Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn mount_reuses_scheduler_and_cache() {
        let mut mgr = manager();
        let a = mgr.mount("cam1").unwrap();
        let b = mgr.mount("cam1").unwrap();
        assert!(Arc::ptr_eq(a.index(), b.index()));

        a.index().write().record_day("2026-08-01", vec![1; 10]);
        assert!(mgr.unmount("cam1"));
        let c = mgr.mount("cam1").unwrap();
        assert!(c.index().read().has_day("2026-08-01"));
        assert_eq!(mgr.registry().len(), 1);
    }

    #[test]
    fn unknown_camera_is_rejected() {
        let mut mgr = manager();
        assert!(mgr.mount("nope").is_err());
    }

    #[test]
    fn switch_clears_old_camera() {
        let mut mgr = manager();
        let a = mgr.mount("cam1").unwrap();
        a.index().write().record_day("2026-08-01", vec![1; 10]);
        let b = mgr.switch_camera("cam1", "cam2").unwrap();
        assert_eq!(b.camera().id, "cam2");
        assert_eq!(a.index().read().day_count(), 0);
        assert_eq!(mgr.mounted(), vec!["cam2"]);
    }

    #[test]
    fn remove_disposes_registry_entry() {
        let mut mgr = manager();
        mgr.mount("cam1").unwrap();
        assert!(mgr.remove_camera("cam1"));
        assert!(mgr.registry().is_empty());
        assert!(!mgr.remove_camera("cam1"));
        assert_eq!(mgr.list_cameras().len(), 2);
    }
}
