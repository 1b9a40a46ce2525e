use std::collections::HashSet;

use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};
use crate::zoom::ZOOM_LEVELS;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Archive RPC endpoint.
    pub server: ServerConfig,
    /// Timeline cache and scheduler tuning.
    #[serde(default)]
    pub timeline: TimelineConfig,
    /// Cameras whose archive timelines can be browsed.
    pub cameras: Vec<CameraConfig>,
}

/// Where the archive RPC service lives.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path the JSON-RPC requests are POSTed to.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,
    #[serde(default)]
    pub tls: bool,
}

impl ServerConfig {
    /// Full URL of the RPC endpoint.
    pub fn rpc_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let path = if self.rpc_path.starts_with('/') {
            self.rpc_path.clone()
        } else {
            format!("/{}", self.rpc_path)
        };
        format!("{scheme}://{}:{}{path}", self.host, self.port)
    }
}

/// Scheduler and cache parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct TimelineConfig {
    /// Screens buffered on each side of the visible range.
    #[serde(default = "default_buffer_screens")]
    pub buffer_screens: u32,
    /// Collapse window for interactive (non-immediate) range requests.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Per-request timeout. 0 disables the timeout.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// The day/interval containing "now" is re-fetched once its coverage is
    /// older than this. 0 disables live refresh.
    #[serde(default = "default_live_refresh")]
    pub live_refresh_secs: u64,
    /// Calendar offset for day keys. Defaults to the host offset at startup.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_zoom_index")]
    pub default_zoom_index: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            buffer_screens: default_buffer_screens(),
            debounce_ms: default_debounce_ms(),
            fetch_timeout_secs: default_fetch_timeout(),
            live_refresh_secs: default_live_refresh(),
            utc_offset_minutes: None,
            default_zoom_index: default_zoom_index(),
        }
    }
}

impl TimelineConfig {
    /// Resolve the calendar offset used for day keys.
    pub fn offset(&self) -> Result<FixedOffset> {
        match self.utc_offset_minutes {
            Some(minutes) => FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                TimelineError::Config(format!("utc_offset_minutes out of range: {minutes}"))
            }),
            None => Ok(Local::now().offset().fix()),
        }
    }
}

/// Per-camera configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Unique identifier, also the cache identity together with the server.
    pub id: String,
    /// Human-readable label shown in listings.
    pub name: String,
    /// Archive channel number, if the server multiplexes channels.
    #[serde(default)]
    pub channel: Option<u32>,
    /// Archive stream name (e.g. "main", "sub").
    #[serde(default)]
    pub stream: Option<String>,
}

fn default_port() -> u16 { 8080 }
fn default_rpc_path() -> String { "/rpc".into() }
fn default_buffer_screens() -> u32 { 2 }
fn default_debounce_ms() -> u64 { 1000 }
fn default_fetch_timeout() -> u64 { 30 }
fn default_live_refresh() -> u64 { 60 }
fn default_zoom_index() -> usize { 4 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TimelineError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| TimelineError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a camera by id.
    pub fn camera(&self, id: &str) -> Result<&CameraConfig> {
        self.cameras
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| TimelineError::CameraNotFound { id: id.to_string() })
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(TimelineError::Config("No cameras defined".into()));
        }
        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if !seen.insert(cam.id.as_str()) {
                return Err(TimelineError::Config(format!("Duplicate camera id '{}'", cam.id)));
            }
        }
        if self.server.host.trim().is_empty() {
            return Err(TimelineError::Config("server.host must not be empty".into()));
        }
        if self.timeline.buffer_screens == 0 {
            return Err(TimelineError::Config("buffer_screens must be > 0".into()));
        }
        if self.timeline.default_zoom_index >= ZOOM_LEVELS.len() {
            return Err(TimelineError::Config(format!(
                "default_zoom_index must be < {}",
                ZOOM_LEVELS.len()
            )));
        }
        self.timeline.offset()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        host = "10.0.0.5"

        [[cameras]]
        id = "cam1"
        name = "Gate"
    "#;

    #[test]
    fn defaults_are_applied() {
        let cfg = Config::from_toml(MINIMAL).expect("parse");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.rpc_url(), "http://10.0.0.5:8080/rpc");
        assert_eq!(cfg.timeline.buffer_screens, 2);
        assert_eq!(cfg.timeline.debounce_ms, 1000);
        assert!(cfg.cameras[0].channel.is_none());
    }

    #[test]
    fn duplicate_cameras_rejected() {
        let text = format!("{MINIMAL}\n[[cameras]]\nid = \"cam1\"\nname = \"Again\"\n");
        assert!(matches!(Config::from_toml(&text), Err(TimelineError::Config(_))));
    }

    #[test]
    fn zoom_index_out_of_ladder_rejected() {
        let text = format!("{MINIMAL}\n[timeline]\ndefault_zoom_index = 99\n");
        assert!(Config::from_toml(&text).is_err());
    }

    #[test]
    fn explicit_offset_is_used() {
        let text = format!("{MINIMAL}\n[timeline]\nutc_offset_minutes = 180\n");
        let cfg = Config::from_toml(&text).expect("parse");
        assert_eq!(cfg.timeline.offset().unwrap().local_minus_utc(), 3 * 3600);
    }
}
