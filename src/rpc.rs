//! Archive RPC client: fetches second-resolution availability timelines.
//!
//! Every call is a JSON POST:
//!
//! ```text
//! { "method": "archive.get_frames_timeline",
//!   "params": { "start_time": [Y,M,D,h,m,s], "end_time": [...], "unit_len": 1,
//!               "channel": 0, "stream": "main", "filter": {...} } }
//! ```
//!
//! answered by `{"result": {"timeline": [0,1,...]}}` or
//! `{"error": {"type": "auth", "message": "forbidden"}}`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{CameraConfig, ServerConfig};
use crate::error::{Result, TimelineError};
use crate::time_utils;

/// Which availability timeline to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineKind {
    Frames,
    Motions,
    Objects,
}

impl TimelineKind {
    pub fn method(&self) -> &'static str {
        match self {
            TimelineKind::Frames => "archive.get_frames_timeline",
            TimelineKind::Motions => "archive.get_motions_timeline",
            TimelineKind::Objects => "archive.get_objects_timeline",
        }
    }
}

/// Detection filter restricting the timeline to motion or object events.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineFilter {
    Motion(Value),
    Object(Value),
}

impl TimelineFilter {
    pub fn kind(&self) -> TimelineKind {
        match self {
            TimelineFilter::Motion(_) => TimelineKind::Motions,
            TimelineFilter::Object(_) => TimelineKind::Objects,
        }
    }

    pub fn params(&self) -> &Value {
        match self {
            TimelineFilter::Motion(p) | TimelineFilter::Object(p) => p,
        }
    }

    /// Opaque identity of the filter parameters. Object keys serialize in
    /// sorted order, so equal filters always produce equal signatures.
    pub fn signature(&self) -> String {
        let prefix = match self {
            TimelineFilter::Motion(_) => "motion",
            TimelineFilter::Object(_) => "object",
        };
        format!("{prefix}:{}", self.params())
    }
}

/// One timeline request. `end` is the last second included.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineQuery {
    pub kind: TimelineKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit_len_secs: u32,
    pub channel: Option<u32>,
    pub stream: Option<String>,
    pub filter: Option<Value>,
}

impl TimelineQuery {
    /// Number of elements a well-formed answer carries.
    pub fn expected_len(&self) -> usize {
        let secs = (self.end - self.start).num_seconds().max(0) as usize;
        secs / self.unit_len_secs.max(1) as usize + 1
    }
}

/// Source of availability timelines.
pub trait ArchiveClient: Send + Sync + 'static {
    fn get_timeline(&self, query: TimelineQuery) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

// ──────────────── wire types ──────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest<'a> {
    method: &'static str,
    params: TimelineParams<'a>,
}

#[derive(Serialize)]
struct TimelineParams<'a> {
    start_time: [i32; 6],
    end_time: [i32; 6],
    unit_len: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<TimelineResult>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct TimelineResult {
    timeline: Vec<f64>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Build the JSON body for `query`, with times in the archive's local calendar.
pub fn request_body(query: &TimelineQuery, offset: FixedOffset) -> Value {
    let req = RpcRequest {
        method: query.kind.method(),
        params: TimelineParams {
            start_time: time_utils::rpc_time(query.start, offset),
            end_time: time_utils::rpc_time(query.end, offset),
            unit_len: query.unit_len_secs,
            channel: query.channel,
            stream: query.stream.as_deref(),
            filter: query.filter.as_ref(),
        },
    };
    serde_json::to_value(req).unwrap_or(Value::Null)
}

/// Decode a response body into a presence bitmap.
pub fn parse_timeline_response(body: &str) -> Result<Vec<u8>> {
    let resp: RpcResponse = serde_json::from_str(body)
        .map_err(|e| TimelineError::Malformed(format!("invalid JSON: {e}")))?;

    if let Some(err) = resp.error {
        if err.kind.eq_ignore_ascii_case("auth") && err.message.eq_ignore_ascii_case("forbidden") {
            return Err(TimelineError::Forbidden);
        }
        return Err(TimelineError::Rpc(format!("{}: {}", err.kind, err.message)));
    }

    let result = resp
        .result
        .ok_or_else(|| TimelineError::Malformed("neither result nor error present".into()))?;
    Ok(result
        .timeline
        .into_iter()
        .map(|v| v.round().clamp(0.0, u8::MAX as f64) as u8)
        .collect())
}

/// Truncate or zero-pad `bitmap` to `len` elements.
pub fn normalize_len(mut bitmap: Vec<u8>, len: usize) -> Vec<u8> {
    bitmap.resize(len, 0);
    bitmap
}

/// [`ArchiveClient`] speaking JSON over HTTP.
pub struct HttpArchiveClient {
    client: reqwest::Client,
    url: String,
    offset: FixedOffset,
}

impl HttpArchiveClient {
    pub fn new(server: &ServerConfig, offset: FixedOffset) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TimelineError::Config(format!("Cannot build HTTP client: {e}")))?;
        Ok(Self { client, url: server.rpc_url(), offset })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ArchiveClient for HttpArchiveClient {
    async fn get_timeline(&self, query: TimelineQuery) -> Result<Vec<u8>> {
        let body = request_body(&query, self.offset);
        debug!(method = query.kind.method(), start = %query.start, end = %query.end, "Timeline request");

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(TimelineError::Forbidden);
        }
        if !status.is_success() {
            return Err(TimelineError::Http { status: status.as_u16() });
        }
        let text = resp.text().await?;
        parse_timeline_response(&text)
    }
}

/// Camera-specific parts of a query.
pub fn query_for_camera(
    camera: &CameraConfig,
    kind: TimelineKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: Option<&TimelineFilter>,
) -> TimelineQuery {
    TimelineQuery {
        kind,
        start,
        end,
        unit_len_secs: 1,
        channel: camera.channel,
        stream: camera.stream.clone(),
        filter: filter.map(|f| f.params().clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn body_uses_local_calendar_fields() {
        let query = TimelineQuery {
            kind: TimelineKind::Frames,
            start: Utc.with_ymd_and_hms(2026, 4, 1, 21, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 4, 2, 20, 59, 59).unwrap(),
            unit_len_secs: 1,
            channel: Some(2),
            stream: None,
            filter: None,
        };
        let body = request_body(&query, FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(
            body,
            json!({
                "method": "archive.get_frames_timeline",
                "params": {
                    "start_time": [2026, 4, 2, 0, 0, 0],
                    "end_time": [2026, 4, 2, 23, 59, 59],
                    "unit_len": 1,
                    "channel": 2
                }
            })
        );
        assert_eq!(query.expected_len(), 86_400);
    }

    #[test]
    fn parses_result_and_errors() {
        assert_eq!(parse_timeline_response(r#"{"result":{"timeline":[0,1,3,0]}}"#).unwrap(), vec![0, 1, 3, 0]);
        assert!(parse_timeline_response(r#"{"error":{"type":"auth","message":"forbidden"}}"#)
            .unwrap_err()
            .is_forbidden());
        assert!(matches!(
            parse_timeline_response(r#"{"error":{"type":"archive","message":"busy"}}"#),
            Err(TimelineError::Rpc(_))
        ));
        assert!(matches!(parse_timeline_response(r#"{"result":{}}"#), Err(TimelineError::Malformed(_))));
        assert!(matches!(parse_timeline_response("<html>"), Err(TimelineError::Malformed(_))));
    }

    #[test]
    fn filter_signature_is_order_independent() {
        let a = TimelineFilter::Motion(json!({"zone": 1, "sensitivity": 4}));
        let b = TimelineFilter::Motion(json!({"sensitivity": 4, "zone": 1}));
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), TimelineFilter::Object(json!({"zone": 1, "sensitivity": 4})).signature());
        assert_eq!(a.kind().method(), "archive.get_motions_timeline");
    }

    #[test]
    fn normalize_pads_and_truncates() {
        assert_eq!(normalize_len(vec![1, 1], 4), vec![1, 1, 0, 0]);
        assert_eq!(normalize_len(vec![1, 1, 1], 1), vec![1]);
    }
}
