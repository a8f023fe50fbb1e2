use serde::{Deserialize, Serialize};

/// A catalog entry.
///
/// Deserialized straight from the source catalog, where `id` is absent; the
/// ingestion pipeline assigns it before the record reaches the store. The
/// extract embedding is owned by the store and never travels on this type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub extract: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail_width: Option<u32>,
    #[serde(default)]
    pub thumbnail_height: Option<u32>,
}

impl Movie {
    /// Text the embedding backfill vectorizes: the extract, or the title when
    /// the extract is blank.
    pub fn embedding_source(&self) -> &str {
        if self.extract.trim().is_empty() {
            &self.title
        } else {
            &self.extract
        }
    }
}

/// A query hit. `score` is the cosine distance to the query vector and is
/// present only when a KNN filter was applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredMovie {
    pub movie: Movie,
    pub score: Option<f64>,
}

/// An autocomplete suggestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The suggested title.
    pub text: String,
    /// Metadata of the source document, for client-side hydration.
    pub payload: serde_json::Value,
}

/// A document still waiting for its extract embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEmbedding {
    pub id: String,
    pub text: String,
}
