//! Configuration settings for Kilns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub store: StoreSettings,
    pub expansion: ExpansionSettings,
    pub search: SearchSettings,
}


/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.kilns".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Caption store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.kilns/captions.db".to_string(),
        }
    }
}

/// Query expansion strategy.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStrategy {
    /// Rule-based expansion (default, no external calls).
    #[default]
    Deterministic,
    /// LLM-backed concept expansion with deterministic fallback.
    Concept,
}

impl std::str::FromStr for ExpansionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deterministic" | "rules" => Ok(ExpansionStrategy::Deterministic),
            "concept" | "llm" => Ok(ExpansionStrategy::Concept),
            _ => Err(format!("Unknown expansion strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpansionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpansionStrategy::Deterministic => write!(f, "deterministic"),
            ExpansionStrategy::Concept => write!(f, "concept"),
        }
    }
}

/// Query expansion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionSettings {
    /// Expansion strategy (deterministic, concept).
    pub strategy: ExpansionStrategy,
    /// Chat model for concept expansion.
    pub model: String,
    /// Timeout for concept expansion before falling back (seconds).
    pub timeout_seconds: u64,
    /// Maximum number of word pair/triple variants per query.
    pub max_phrase_variants: usize,
    /// Domain synonym table; mostly recurring transcription errors.
    pub synonyms: HashMap<String, Vec<String>>,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            strategy: ExpansionStrategy::Deterministic,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 10,
            max_phrase_variants: 4,
            synonyms: default_synonyms(),
        }
    }
}

/// Names the auto-captioner keeps mishearing in this archive.
fn default_synonyms() -> HashMap<String, Vec<String>> {
    let groups: [(&str, &[&str]); 5] = [
        ("maureen", &["moren", "meen", "maurine", "moreen"]),
        ("moren", &["maureen", "meen", "maurine", "moreen"]),
        ("meen", &["maureen", "moren", "maurine", "moreen"]),
        ("tolkien", &["tolkin", "tolkein"]),
        ("narnia", &["narnea", "narnya"]),
    ];

    groups
        .into_iter()
        .map(|(word, alts)| {
            (
                word.to_string(),
                alts.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

/// Ranked search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Row cap per variant lookup against the text index.
    pub variant_fetch_limit: usize,
    /// Stop trying further variants once this many distinct videos matched.
    pub target_videos: usize,
    /// Same-video matches closer than this collapse to one result (seconds).
    pub cluster_window_seconds: f64,
    /// Result count when the caller does not specify one.
    pub default_limit: usize,
    /// Hard cap on the requested result count.
    pub max_limit: usize,
    /// Geometric decay of variant priority weight; must stay at or below
    /// 4/7 so per-variant score bands cannot overlap.
    pub priority_decay: f64,
    /// Degrade read-path storage errors to an empty result instead of
    /// failing the query.
    pub fault_tolerant_reads: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            variant_fetch_limit: 200,
            target_videos: 20,
            cluster_window_seconds: 30.0,
            default_limit: 10,
            max_limit: 50,
            priority_decay: 0.5,
            fault_tolerant_reads: false,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::KilnsError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kilns")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}
