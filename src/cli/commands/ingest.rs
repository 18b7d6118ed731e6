//! Ingest command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::ingest::{ingest_bundle, load_bundles};
use crate::store::SqliteStore;
use anyhow::Result;
use std::path::Path;

/// Ingest one scrape file into the caption store.
pub async fn run_ingest(file: &str, settings: Settings) -> Result<()> {
    let bundles = load_bundles(Path::new(file))?;
    if bundles.is_empty() {
        Output::warning("Scrape file contained no videos.");
        return Ok(());
    }

    let store = SqliteStore::new(&settings.sqlite_path())?;

    let pb = Output::progress_bar(bundles.len() as u64, "Ingesting");
    let mut added = 0usize;
    let mut skipped = 0usize;

    for bundle in &bundles {
        let report = ingest_bundle(&store, bundle).await?;
        if report.captions_skipped {
            skipped += 1;
        } else {
            added += report.segments_added;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Output::success(&format!(
        "Ingested {} videos ({} caption segments, {} already present)",
        bundles.len(),
        added,
        skipped
    ));
    Ok(())
}
