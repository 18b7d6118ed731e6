//! Search command implementation.

use crate::assemble::{assemble, SearchStatus};
use crate::cli::Output;
use crate::config::Settings;
use crate::engine::SearchEngine;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, limit: usize, json: bool, settings: Settings) -> Result<()> {
    let engine = SearchEngine::from_settings(&settings)?;

    let spinner = Output::spinner("Searching...");
    let ranked = engine.search(query, limit).await;
    spinner.finish_and_clear();

    let response = match ranked {
        Ok(ranked) => assemble(ranked),
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response.status {
        SearchStatus::NoResults => {
            Output::warning("No results found matching your query.");
        }
        SearchStatus::Ok => {
            Output::success(&format!("Found {} results", response.results.len()));
            for hit in &response.results {
                Output::search_result(
                    &hit.title,
                    &hit.start_time,
                    hit.score,
                    &hit.text,
                    &hit.youtube_url,
                    &hit.explanation,
                );
            }
        }
    }

    Ok(())
}
