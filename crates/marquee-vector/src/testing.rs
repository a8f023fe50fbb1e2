//! Store doubles for unit tests.

use std::sync::Mutex;

use marquee_core::error::MarqueeError;
use marquee_core::schema::Schema;
use marquee_core::types::{Movie, PendingEmbedding, ScoredMovie, Suggestion};
use marquee_storage::{CatalogStore, MovieQuery};

fn unavailable<T>() -> Result<T, MarqueeError> {
    Err(MarqueeError::StoreUnavailable("connection refused".to_string()))
}

/// A store whose every call fails.
pub struct FailingStore;

impl CatalogStore for FailingStore {
    fn schema(&self) -> &Schema {
        static SCHEMA: std::sync::OnceLock<Schema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| Schema::movies(8))
    }

    fn exists_by_id(&self, _id: &str) -> Result<bool, MarqueeError> {
        unavailable()
    }

    fn save_all(&self, _movies: &[Movie]) -> Result<usize, MarqueeError> {
        unavailable()
    }

    fn count(&self) -> Result<u64, MarqueeError> {
        unavailable()
    }

    fn query(&self, _query: &MovieQuery) -> Result<Vec<ScoredMovie>, MarqueeError> {
        unavailable()
    }

    fn suggest(&self, _: &str, _: &str, _: usize) -> Result<Vec<Suggestion>, MarqueeError> {
        unavailable()
    }

    fn tag_values(&self, _field: &str) -> Result<Vec<String>, MarqueeError> {
        unavailable()
    }

    fn pending_embeddings(&self, _limit: usize) -> Result<Vec<PendingEmbedding>, MarqueeError> {
        unavailable()
    }

    fn set_embedding(&self, _id: &str, _vector: &[f32]) -> Result<(), MarqueeError> {
        unavailable()
    }

    fn mark_embedding_failed(&self, _id: &str) -> Result<(), MarqueeError> {
        unavailable()
    }

    fn embedded_count(&self) -> Result<u64, MarqueeError> {
        unavailable()
    }
}

/// A store that records saved batches and reports a fixed count.
pub struct RecordingStore {
    schema: Schema,
    batches: Mutex<Vec<Vec<Movie>>>,
    count: u64,
}

impl RecordingStore {
    pub fn with_count(count: u64) -> Self {
        Self {
            schema: Schema::movies(8),
            batches: Mutex::new(Vec::new()),
            count,
        }
    }

    pub fn saved_titles(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|m| m.title.clone())
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::with_count(0)
    }
}

impl CatalogStore for RecordingStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn exists_by_id(&self, _id: &str) -> Result<bool, MarqueeError> {
        Ok(false)
    }

    fn save_all(&self, movies: &[Movie]) -> Result<usize, MarqueeError> {
        self.batches.lock().unwrap().push(movies.to_vec());
        Ok(movies.len())
    }

    fn count(&self) -> Result<u64, MarqueeError> {
        Ok(self.count)
    }

    fn query(&self, _query: &MovieQuery) -> Result<Vec<ScoredMovie>, MarqueeError> {
        Ok(Vec::new())
    }

    fn suggest(&self, _: &str, _: &str, _: usize) -> Result<Vec<Suggestion>, MarqueeError> {
        Ok(Vec::new())
    }

    fn tag_values(&self, _field: &str) -> Result<Vec<String>, MarqueeError> {
        Ok(Vec::new())
    }

    fn pending_embeddings(&self, _limit: usize) -> Result<Vec<PendingEmbedding>, MarqueeError> {
        Ok(Vec::new())
    }

    fn set_embedding(&self, _id: &str, _vector: &[f32]) -> Result<(), MarqueeError> {
        Ok(())
    }

    fn mark_embedding_failed(&self, _id: &str) -> Result<(), MarqueeError> {
        Ok(())
    }

    fn embedded_count(&self) -> Result<u64, MarqueeError> {
        Ok(0)
    }
}
