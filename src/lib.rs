//! Kilns - Caption Archive Search
//!
//! A local-first CLI tool for storing scraped YouTube caption tracks and
//! searching them with ranked, timestamp-accurate results.
//!
//! The name comes from The Kilns, C.S. Lewis's home outside Oxford; the tool
//! grew out of an archive of long-form readings of his letters and diaries.
//!
//! # Overview
//!
//! Kilns allows you to:
//! - Store scraped video metadata and timestamped caption segments
//! - Search hundreds of thousands of caption rows with full-text matching
//! - Get ranked, deduplicated results with links to the exact moment
//! - Optionally expand vague queries with an LLM, with a deterministic fallback
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `store` - Caption store: videos, segments, and the full-text index
//! - `ingest` - Scraper data contract and batch ingestion
//! - `expand` - Query expansion strategies
//! - `engine` - Ranked search: variant lookups, scoring, clustering
//! - `assemble` - Caller-facing result assembly
//!
//! # Example
//!
//! ```rust,no_run
//! use kilns::assemble::assemble;
//! use kilns::config::Settings;
//! use kilns::engine::SearchEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let engine = SearchEngine::from_settings(&settings)?;
//!
//!     let ranked = engine.search("medieval literature", 10).await?;
//!     let response = assemble(ranked);
//!     println!("{} results", response.results.len());
//!
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod expand;
pub mod ingest;
pub mod openai;
pub mod store;

pub use error::{KilnsError, Result};
