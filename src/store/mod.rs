//! Caption store abstraction for Kilns.
//!
//! The store is the sole point of contact with persistent storage: video
//! metadata, timestamped caption segments, and the full-text index over
//! caption text all live behind the [`CaptionStore`] trait.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one scraped video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// YouTube video ID. Immutable once created.
    pub video_id: String,
    /// Video title. Required, immutable.
    pub title: String,
    /// Channel/uploader name.
    pub uploader: Option<String>,
    /// Upload date as YYYYMMDD (YouTube metadata format).
    pub upload_date: Option<String>,
    /// Duration in seconds.
    pub duration_seconds: Option<u32>,
    /// View count at scrape time.
    pub view_count: Option<u64>,
    /// Video description.
    pub description: Option<String>,
    /// Thumbnail image URL or path.
    pub thumbnail: Option<String>,
    /// Text extracted from the thumbnail image (vision pass). Mutable.
    pub thumbnail_text: Option<String>,
    /// Video tags. Mutable.
    pub tags: Vec<String>,
    /// Playlist IDs this video belongs to. Mutable.
    pub playlists: Vec<String>,
    /// When this video was scraped.
    pub scraped_at: DateTime<Utc>,
}

impl Video {
    /// Create a video record with only the required fields set.
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            uploader: None,
            upload_date: None,
            duration_seconds: None,
            view_count: None,
            description: None,
            thumbnail: None,
            thumbnail_text: None,
            tags: Vec::new(),
            playlists: Vec::new(),
            scraped_at: Utc::now(),
        }
    }
}

/// One timestamped caption segment, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionSegment {
    /// Owning video ID.
    pub video_id: String,
    /// Stable ordering within the video.
    pub sequence_number: i64,
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Spoken/subtitled text.
    pub text: String,
}

impl CaptionSegment {
    /// Format the start time for display.
    pub fn format_timestamp(&self) -> String {
        let total_seconds = self.start_seconds as u32;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{:02}:{:02}", minutes, secs)
        }
    }
}

/// A caption segment to be appended, before it is bound to a video.
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub sequence_number: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

/// One row returned by a full-text lookup.
#[derive(Debug, Clone)]
pub struct TextMatch {
    /// The matched segment.
    pub segment: CaptionSegment,
    /// Title of the owning video.
    pub video_title: String,
    /// Upload date of the owning video (YYYYMMDD).
    pub upload_date: Option<String>,
    /// Unweighted relevance from the text index (higher is better).
    pub raw_score: f64,
}

/// Summary information about a stored video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub upload_date: Option<String>,
    pub segment_count: u64,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub video_count: u64,
    pub segment_count: u64,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// Trait for caption store implementations.
#[async_trait]
pub trait CaptionStore: Send + Sync {
    /// Insert a video or update the mutable fields (thumbnail, thumbnail
    /// text, tags, playlists) of an existing one. Idempotent. Fails with
    /// `Conflict` when the title is missing.
    async fn upsert_video(&self, video: &Video) -> Result<String>;

    /// Append caption segments for a known video. All-or-nothing: on success
    /// the full-text index already reflects the new rows. Fails with
    /// `Validation` for an unknown video, out-of-order segments, duplicate
    /// sequence numbers, or empty text.
    async fn append_segments(&self, video_id: &str, segments: &[NewSegment]) -> Result<usize>;

    /// Look up a single token or phrase in the full-text index. Rows come
    /// back ordered by raw relevance descending, earlier segments first on
    /// ties. An unmatched term yields an empty list, not an error.
    async fn query_text(&self, term: &str, limit: usize) -> Result<Vec<TextMatch>>;

    /// Fetch a video's metadata.
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>>;

    /// All segments for a video, in sequence order.
    async fn get_segments(&self, video_id: &str) -> Result<Vec<CaptionSegment>>;

    /// Per-video summaries, most recently uploaded first.
    async fn list_videos(&self) -> Result<Vec<VideoSummary>>;

    /// Administrative purge: delete a video and cascade to its segments and
    /// index entries. Returns the number of segments removed.
    async fn delete_video(&self, video_id: &str) -> Result<usize>;

    /// Aggregate counts.
    async fn stats(&self) -> Result<StoreStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_timestamp_format() {
        let seg = CaptionSegment {
            video_id: "test".to_string(),
            sequence_number: 0,
            start_seconds: 125.0,
            end_seconds: 130.0,
            text: "content".to_string(),
        };
        assert_eq!(seg.format_timestamp(), "02:05");

        let seg = CaptionSegment {
            start_seconds: 3930.5,
            ..seg
        };
        assert_eq!(seg.format_timestamp(), "01:05:30");
    }
}
