//! The catalog store interface consumed by ingestion, backfill, and search.

use marquee_core::error::MarqueeError;
use marquee_core::schema::Schema;
use marquee_core::types::{Movie, PendingEmbedding, ScoredMovie, Suggestion};

use crate::query::MovieQuery;

/// Document store with field indexing, KNN search, and a suggestion
/// dictionary.
///
/// Implementations must be safe to share across request handlers and the
/// backfill task.
pub trait CatalogStore: Send + Sync {
    /// The schema the store was opened with.
    fn schema(&self) -> &Schema;

    /// Whether a document with this key exists.
    fn exists_by_id(&self, id: &str) -> Result<bool, MarqueeError>;

    /// Write a batch of documents atomically, replacing any with the same
    /// key. Replaced documents lose their embedding. Returns the number
    /// written.
    fn save_all(&self, movies: &[Movie]) -> Result<usize, MarqueeError>;

    /// Total number of documents.
    fn count(&self) -> Result<u64, MarqueeError>;

    /// Run a query. Hits carry a distance score only when the query has a
    /// KNN clause.
    fn query(&self, query: &MovieQuery) -> Result<Vec<ScoredMovie>, MarqueeError>;

    /// Case-insensitive prefix lookup in the suggestion dictionary of an
    /// autocomplete field.
    fn suggest(
        &self,
        field: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>, MarqueeError>;

    /// Every value occurrence of a tag field, duplicates included.
    fn tag_values(&self, field: &str) -> Result<Vec<String>, MarqueeError>;

    /// Documents without an embedding that have not failed before.
    fn pending_embeddings(&self, limit: usize) -> Result<Vec<PendingEmbedding>, MarqueeError>;

    /// Store the embedding of a document. Rejects vectors whose dimension
    /// differs from the schema's.
    fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<(), MarqueeError>;

    /// Exclude a document from further backfill passes.
    fn mark_embedding_failed(&self, id: &str) -> Result<(), MarqueeError>;

    /// Number of documents carrying an embedding.
    fn embedded_count(&self) -> Result<u64, MarqueeError>;
}
