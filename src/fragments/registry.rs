//! Process-wide registry of fragment caches, one per camera identity.
//!
//! A cache outlives any single timeline view: remounting a view for the same
//! camera reuses what was already downloaded. Entries leave only through
//! [`FragmentCacheRegistry::dispose`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, FixedOffset};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::fragments::index::{FragmentIndex, SharedFragmentIndex};

/// Cache identity: the same camera id on a different server is a different
/// archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraKey {
    pub camera: String,
    pub host: String,
    pub port: u16,
}

impl CameraKey {
    pub fn new(camera: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { camera: camera.into(), host: host.into(), port }
    }
}

impl fmt::Display for CameraKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.camera, self.host, self.port)
    }
}

pub struct FragmentCacheRegistry {
    offset: FixedOffset,
    live_refresh: Option<Duration>,
    entries: RwLock<HashMap<CameraKey, SharedFragmentIndex>>,
}

impl FragmentCacheRegistry {
    pub fn new(offset: FixedOffset, live_refresh: Option<Duration>) -> Self {
        Self { offset, live_refresh, entries: RwLock::new(HashMap::new()) }
    }

    /// Return the cache for `key`, creating an empty one on first use.
    pub fn get_or_create(&self, key: &CameraKey) -> SharedFragmentIndex {
        if let Some(existing) = self.entries.read().get(key) {
            return existing.clone();
        }
        let mut entries = self.entries.write();
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(camera = %key, "Fragment cache created");
                Arc::new(RwLock::new(
                    FragmentIndex::new(self.offset).with_live_refresh(self.live_refresh),
                ))
            })
            .clone()
    }

    pub fn get(&self, key: &CameraKey) -> Option<SharedFragmentIndex> {
        self.entries.read().get(key).cloned()
    }

    /// Forget a camera permanently. Returns whether an entry existed.
    pub fn dispose(&self, key: &CameraKey) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            info!(camera = %key, "Fragment cache disposed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
