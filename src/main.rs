//! nvr-timeline: archive timeline browser
//!
//! Usage:
//!   nvr-timeline cameras   --config config.toml
//!   nvr-timeline fragments --config config.toml --camera cam1 \
//!       --from 2026-08-03T08:00:00 --to 2026-08-03T12:00:00 [--zoom 6] [--motion '{"zones":[1]}']

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nvr_timeline::config::Config;
use nvr_timeline::manager::TimelineManager;
use nvr_timeline::rpc::TimelineFilter;
use nvr_timeline::time_utils::{self, TimeRange};

const BAR_WIDTH: usize = 72;

#[derive(Parser)]
#[command(name = "nvr-timeline", about = "Browse NVR archive availability", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured cameras.
    Cameras {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print recorded fragments for a camera and time range.
    Fragments {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Camera ID to query.
        #[arg(long)]
        camera: String,
        /// Range start, local time (YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        from: String,
        /// Range end, local time (YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        to: String,
        /// Zoom ladder index; picks the bitmap resolution.
        #[arg(long)]
        zoom: Option<usize>,
        /// Motion filter parameters as JSON.
        #[arg(long)]
        motion: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Cameras { config } => run_cameras(config),
        Command::Fragments { config, camera, from, to, zoom, motion } => {
            run_fragments(config, &camera, &from, &to, zoom, motion).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

fn run_cameras(config_path: PathBuf) -> anyhow::Result<()> {
    let cfg = Config::from_file(&config_path)?;
    println!("=== Cameras ({}) ===", cfg.server.rpc_url());
    for cam in &cfg.cameras {
        let channel = cam.channel.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        let stream = cam.stream.as_deref().unwrap_or("-");
        println!("  {} ({})  channel={} stream={}", cam.id, cam.name, channel, stream);
    }
    Ok(())
}

async fn run_fragments(
    config_path: PathBuf,
    camera_id: &str,
    from: &str,
    to: &str,
    zoom: Option<usize>,
    motion: Option<String>,
) -> anyhow::Result<()> {
    let cfg = Config::from_file(&config_path)?;
    let offset = cfg.timeline.offset()?;
    let range = TimeRange::new(parse_local(from, offset)?, parse_local(to, offset)?);
    if range.is_empty() {
        bail!("--to must be after --from");
    }
    let zoom_index = zoom.unwrap_or(cfg.timeline.default_zoom_index);

    let filter = motion
        .map(|json| serde_json::from_str(&json).map(TimelineFilter::Motion))
        .transpose()
        .context("Invalid --motion JSON")?;

    info!(camera = camera_id, from, to, zoom = zoom_index, filtered = filter.is_some(), "Loading fragments");

    let mut manager = TimelineManager::new(cfg)?;
    let scheduler = manager.mount(camera_id)?;
    scheduler.set_filter(filter);
    scheduler.handle_timeline_change(range.start, range.end, zoom_index).await;

    if !scheduler.has_timeline_access() {
        return Err(anyhow!("Archive refused timeline access for camera '{camera_id}'"));
    }

    let snapshot = scheduler.fragments();
    let visible: Vec<TimeRange> = snapshot
        .ranges
        .iter()
        .filter(|r| r.overlaps(&range))
        .map(|r| TimeRange::new(r.start.max(range.start), r.end.min(range.end)))
        .collect();

    println!("Camera {camera_id}, unit {}s", snapshot.unit_len_secs);
    if visible.is_empty() {
        println!("  no recordings");
    }
    for r in &visible {
        println!(
            "  {} .. {}  ({}s)",
            time_utils::format_cursor_label(r.start, offset),
            time_utils::format_cursor_label(r.end, offset),
            r.duration().num_seconds()
        );
    }
    println!("[{}]", availability_bar(&range, &visible, BAR_WIDTH));
    Ok(())
}

fn parse_local(s: &str, offset: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .with_context(|| format!("Invalid time '{s}', expected YYYY-MM-DDTHH:MM:SS"))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Ambiguous local time '{s}'"))
}

/// One character per slot: `#` if any recording touches it.
fn availability_bar(range: &TimeRange, fragments: &[TimeRange], width: usize) -> String {
    let slot_ms = (range.duration_ms() / width as i64).max(1);
    (0..width)
        .map(|i| {
            let slot = TimeRange::starting_at(
                range.start + chrono::Duration::milliseconds(slot_ms * i as i64),
                chrono::Duration::milliseconds(slot_ms),
            );
            if fragments.iter().any(|f| f.overlaps(&slot)) { '#' } else { '.' }
        })
        .collect()
}
