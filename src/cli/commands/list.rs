//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::{CaptionStore, SqliteStore};
use anyhow::Result;

/// List stored videos.
pub async fn run_list(settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.sqlite_path())?;
    let videos = store.list_videos().await?;

    if videos.is_empty() {
        Output::info("No videos in the archive yet. Use `kilns ingest` to add some.");
        return Ok(());
    }

    Output::header(&format!("Stored Videos ({})", videos.len()));
    for video in &videos {
        Output::video_info(
            &video.title,
            &video.video_id,
            video.upload_date.as_deref(),
            video.segment_count,
        );
    }

    Ok(())
}
