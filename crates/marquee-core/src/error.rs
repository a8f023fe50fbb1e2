use thiserror::Error;

/// Top-level error type for the Marquee system.
///
/// The first four variants are the failure kinds of the search and ingestion
/// core; the rest cover configuration, schema validation, and the API layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MarqueeError {
    #[error("Catalog source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("Malformed catalog input: {0}")]
    MalformedInput(String),

    #[error("Catalog store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding generator unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MarqueeError {
    fn from(err: toml::de::Error) -> Self {
        MarqueeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MarqueeError {
    fn from(err: toml::ser::Error) -> Self {
        MarqueeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MarqueeError {
    fn from(err: serde_json::Error) -> Self {
        MarqueeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Marquee operations.
pub type Result<T> = std::result::Result<T, MarqueeError>;
