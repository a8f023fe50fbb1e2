use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MarqueeError, Result};

/// Top-level configuration for the Marquee service.
///
/// Loaded from `~/.marquee/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarqueeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl MarqueeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MarqueeConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(MarqueeError::Config(
                "ingest.batch_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(MarqueeError::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.embedding.max_sequence_length == 0 {
            return Err(MarqueeError::Config(
                "embedding.max_sequence_length must be at least 1".to_string(),
            ));
        }
        if self.search.default_neighbors == 0 {
            return Err(MarqueeError::Config(
                "search.default_neighbors must be at least 1".to_string(),
            ));
        }
        if self.search.default_neighbors > self.search.max_neighbors {
            return Err(MarqueeError::Config(format!(
                "search.default_neighbors ({}) exceeds search.max_neighbors ({})",
                self.search.default_neighbors, self.search.max_neighbors
            )));
        }
        Ok(())
    }
}

/// Deployment mode. Selects the ingestion policy, the id strategy, and
/// whether queries are gated on embedding readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Deduplicating load with a year cutoff, KNN over extract embeddings,
    /// queries gated until the catalog is indexed.
    #[default]
    Vector,
    /// Load everything in reverse order, substring search on extract,
    /// queries available immediately.
    FullText,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Vector => write!(f, "vector"),
            SearchMode::FullText => write!(f, "full_text"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = MarqueeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vector" => Ok(SearchMode::Vector),
            "full_text" | "full-text" => Ok(SearchMode::FullText),
            other => Err(MarqueeError::Config(format!(
                "Unknown mode '{}'. Must be one of: vector, full_text",
                other
            ))),
        }
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite catalog.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port.
    pub port: u16,
    /// Deployment mode.
    pub mode: SearchMode,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.marquee/data".to_string(),
            log_level: "info".to_string(),
            port: 3030,
            mode: SearchMode::Vector,
        }
    }
}

/// Startup catalog load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Path to the JSON catalog.
    pub source_path: String,
    /// Documents written per store call.
    pub batch_size: usize,
    /// Movies released in or before this year are skipped in vector mode.
    pub cutoff_year: i32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_path: "data/movies.json".to_string(),
            batch_size: 500,
            cutoff_year: 1980,
        }
    }
}

/// Readiness gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Document count at which the catalog is considered fully indexed.
    pub threshold: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { threshold: 10_000 }
    }
}

/// Query defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Neighbors returned when a similarity query omits `numberOfNearestNeighbors`.
    pub default_neighbors: usize,
    /// Largest accepted `numberOfNearestNeighbors`.
    pub max_neighbors: usize,
    /// Maximum suggestions returned by autocomplete.
    pub suggestion_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_neighbors: 10,
            max_neighbors: 1_000,
            suggestion_limit: 5,
        }
    }
}

/// Embedding generator and backfill worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Directory with `model.onnx` and `tokenizer.json`. When unset, the
    /// deterministic hash embedder is used.
    pub model_dir: Option<String>,
    /// Vector dimension stored in `embeddedExtract`.
    pub dimension: usize,
    /// Tokens kept per text before ONNX inference; longer extracts are
    /// truncated.
    pub max_sequence_length: usize,
    /// Documents embedded per backfill pass.
    pub backfill_batch: usize,
    /// Idle wait between backfill passes, in milliseconds.
    pub backfill_interval_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            dimension: 384,
            max_sequence_length: 256,
            backfill_batch: 64,
            backfill_interval_ms: 500,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Origins allowed by CORS. Empty means localhost on the configured port.
    pub cors_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = MarqueeConfig::default();
        assert_eq!(config.general.port, 3030);
        assert_eq!(config.general.mode, SearchMode::Vector);
        assert_eq!(config.ingest.batch_size, 500);
        assert_eq!(config.ingest.cutoff_year, 1980);
        assert_eq!(config.readiness.threshold, 10_000);
        assert_eq!(config.search.default_neighbors, 10);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.embedding.max_sequence_length, 256);
        assert!(config.embedding.model_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
port = 8080
mode = "full_text"

[ingest]
source_path = "/srv/movies.json"
batch_size = 100

[readiness]
threshold = 250
"#;
        let file = create_temp_config(content);
        let config = MarqueeConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.general.mode, SearchMode::FullText);
        assert_eq!(config.ingest.source_path, "/srv/movies.json");
        assert_eq!(config.ingest.batch_size, 100);
        // Omitted keys in a present section keep their defaults.
        assert_eq!(config.ingest.cutoff_year, 1980);
        assert_eq!(config.readiness.threshold, 250);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = MarqueeConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "~/.marquee/data");
        assert_eq!(config.search.suggestion_limit, 5);
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let file = create_temp_config("[ingest]\nbatch_size = 0\n");
        let err = MarqueeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, MarqueeError::Config(_)));
    }

    #[test]
    fn test_validate_default_neighbors_within_max() {
        let mut config = MarqueeConfig::default();
        config.search.default_neighbors = 50;
        config.search.max_neighbors = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nport = ");
        assert!(MarqueeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_unknown_mode() {
        let file = create_temp_config("[general]\nmode = \"graph\"\n");
        assert!(MarqueeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = MarqueeConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.marquee/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = MarqueeConfig::default();
        config.general.mode = SearchMode::FullText;
        config.embedding.model_dir = Some("/models/minilm".to_string());
        config.save(&path).unwrap();

        let reloaded = MarqueeConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.mode, SearchMode::FullText);
        assert_eq!(reloaded.embedding.model_dir.as_deref(), Some("/models/minilm"));
        assert_eq!(reloaded.ingest.batch_size, config.ingest.batch_size);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Vector);
        assert_eq!("full-text".parse::<SearchMode>().unwrap(), SearchMode::FullText);
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::FullText.to_string(), "full_text");
    }
}
