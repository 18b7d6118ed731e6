//! Export command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::KilnsError;
use crate::store::{CaptionStore, SqliteStore};
use anyhow::Result;
use std::io::Write;

/// Export one video's captions as readable text.
pub async fn run_export(video_id: &str, output: Option<String>, settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.sqlite_path())?;

    let video = store
        .get_video(video_id)
        .await?
        .ok_or_else(|| KilnsError::NotFound(format!("Video {}", video_id)))?;
    let segments = store.get_segments(video_id).await?;

    let mut text = String::new();
    text.push_str(&format!("Title: {}\n", video.title));
    if let Some(uploader) = &video.uploader {
        text.push_str(&format!("Uploader: {}\n", uploader));
    }
    if let Some(date) = &video.upload_date {
        text.push_str(&format!("Upload Date: {}\n", date));
    }
    text.push_str(&format!("Video ID: {}\n", video.video_id));
    text.push_str(&"=".repeat(50));
    text.push_str("\n\n");

    for segment in &segments {
        text.push_str(&format!(
            "[{}]\n{}\n\n",
            segment.format_timestamp(),
            segment.text
        ));
    }

    match output {
        Some(path) => {
            let mut file = std::fs::File::create(&path)?;
            file.write_all(text.as_bytes())?;
            Output::success(&format!(
                "Exported {} segments to {}",
                segments.len(),
                path
            ));
        }
        None => print!("{}", text),
    }

    Ok(())
}
