//! Init command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::SqliteStore;
use anyhow::Result;

/// Initialize the data directory and caption database.
pub fn run_init(settings: &Settings) -> Result<()> {
    Output::header("Kilns Setup");

    std::fs::create_dir_all(settings.data_dir())?;
    Output::success(&format!("Data directory: {}", settings.data_dir().display()));

    SqliteStore::new(&settings.sqlite_path())?;
    Output::success(&format!("Caption database: {}", settings.sqlite_path().display()));

    let config_path = Settings::default_config_path();
    if !config_path.exists() {
        settings.save()?;
        Output::success(&format!("Wrote default config: {}", config_path.display()));
    } else {
        Output::info(&format!("Config already present: {}", config_path.display()));
    }

    Output::info("Ready. Ingest a scrape file with `kilns ingest <file>`.");
    Ok(())
}
