//! Purge command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::KilnsError;
use crate::store::{CaptionStore, SqliteStore};
use anyhow::Result;

/// Delete a video and its captions from the archive.
pub async fn run_purge(video_id: &str, settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.sqlite_path())?;

    match store.delete_video(video_id).await {
        Ok(segments) => {
            Output::success(&format!(
                "Deleted video {} and {} caption segments",
                video_id, segments
            ));
            Ok(())
        }
        Err(KilnsError::NotFound(_)) => {
            Output::warning(&format!("No video with ID {}", video_id));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
