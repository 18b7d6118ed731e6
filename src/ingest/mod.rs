//! Ingestion of scraped caption data.
//!
//! Accepts the scraper's output shape verbatim: one metadata record per
//! video plus caption rows with `"HH:MM:SS.mmm"` clock strings, and feeds
//! it through the caption store's upsert/append operations.

use crate::error::{KilnsError, Result};
use crate::store::{CaptionStore, NewSegment, Video};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// Video metadata as produced by the scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedVideo {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub playlists: Vec<String>,
}

/// One caption cue as produced by the scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedCaption {
    /// Clock string, "HH:MM:SS.mmm".
    pub start_time: String,
    pub end_time: String,
    pub text: String,
    pub sequence_number: i64,
}

/// One video's worth of scraper output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeBundle {
    #[serde(flatten)]
    pub video: ScrapedVideo,
    #[serde(default)]
    pub captions: Vec<ScrapedCaption>,
}

/// Outcome of ingesting one bundle.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub video_id: String,
    pub segments_added: usize,
    /// Captions were already present; metadata was still upserted.
    pub captions_skipped: bool,
}

/// Parse a scraper clock string ("HH:MM:SS.mmm" or "MM:SS.mmm") to seconds.
pub fn parse_clock(clock: &str) -> Result<f64> {
    let invalid = || KilnsError::Validation(format!("Invalid timestamp: {:?}", clock));

    let parts: Vec<&str> = clock.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }

    let mut seconds = 0.0;
    for part in &parts {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        if value < 0.0 {
            return Err(invalid());
        }
        seconds = seconds * 60.0 + value;
    }

    Ok(seconds)
}

/// Ingest one bundle: upsert the video, then append its captions unless the
/// video already has some (re-running a scrape is a no-op for captions).
#[instrument(skip(store, bundle), fields(video_id = %bundle.video.video_id))]
pub async fn ingest_bundle(
    store: &dyn CaptionStore,
    bundle: &ScrapeBundle,
) -> Result<IngestReport> {
    let v = &bundle.video;
    let video = Video {
        video_id: v.video_id.clone(),
        title: v.title.clone(),
        uploader: v.uploader.clone(),
        upload_date: v.upload_date.clone(),
        duration_seconds: v.duration_seconds,
        view_count: v.view_count,
        description: v.description.clone(),
        thumbnail: v.thumbnail.clone(),
        thumbnail_text: v.thumbnail_text.clone(),
        tags: v.tags.clone(),
        playlists: v.playlists.clone(),
        scraped_at: Utc::now(),
    };

    let video_id = store.upsert_video(&video).await?;

    if !store.get_segments(&video_id).await?.is_empty() {
        info!("Video {} already has captions, skipping append", video_id);
        return Ok(IngestReport {
            video_id,
            segments_added: 0,
            captions_skipped: true,
        });
    }

    let segments: Vec<NewSegment> = bundle
        .captions
        .iter()
        .map(|c| {
            Ok(NewSegment {
                sequence_number: c.sequence_number,
                start_seconds: parse_clock(&c.start_time)?,
                end_seconds: parse_clock(&c.end_time)?,
                text: c.text.clone(),
            })
        })
        .collect::<Result<_>>()?;

    let segments_added = store.append_segments(&video_id, &segments).await?;

    Ok(IngestReport {
        video_id,
        segments_added,
        captions_skipped: false,
    })
}

/// Load bundles from a JSON file holding either one bundle or an array.
pub fn load_bundles(path: &Path) -> Result<Vec<ScrapeBundle>> {
    let content = std::fs::read_to_string(path)?;

    if let Ok(bundles) = serde_json::from_str::<Vec<ScrapeBundle>>(&content) {
        return Ok(bundles);
    }

    let single: ScrapeBundle = serde_json::from_str(&content).map_err(|e| {
        KilnsError::Validation(format!("Unrecognized scrape file {:?}: {}", path, e))
    })?;
    Ok(vec![single])
}
