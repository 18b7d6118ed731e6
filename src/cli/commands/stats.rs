//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::{CaptionStore, SqliteStore};
use anyhow::Result;

/// Show archive statistics.
pub async fn run_stats(settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.sqlite_path())?;
    let stats = store.stats().await?;

    Output::header("Archive Statistics");
    Output::kv("Videos", &stats.video_count.to_string());
    Output::kv("Caption segments", &stats.segment_count.to_string());
    Output::kv(
        "Last scraped",
        &stats
            .last_scraped_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
    );

    Ok(())
}
