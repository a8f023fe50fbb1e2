//! Embedding backfill worker.
//!
//! Documents are written without a vector. This worker polls the store for
//! documents still missing `embeddedExtract`, embeds their extract (or
//! title, when the extract is blank), and writes the vector back. A document
//! whose embedding fails is marked and skipped by later passes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use marquee_core::error::MarqueeError;
use marquee_storage::CatalogStore;

use crate::embedding::DynEmbeddingService;

/// Result of one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillPass {
    pub embedded: usize,
    pub failed: usize,
}

impl BackfillPass {
    pub fn processed(&self) -> usize {
        self.embedded + self.failed
    }
}

/// Fills missing extract embeddings in the background.
pub struct EmbeddingBackfill {
    store: Arc<dyn CatalogStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    batch_size: usize,
    idle_interval: Duration,
}

impl EmbeddingBackfill {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        batch_size: usize,
        idle_interval: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
            idle_interval,
        }
    }

    /// Embed up to one batch of pending documents.
    ///
    /// The batch is embedded in one call. If that fails, documents are
    /// embedded one at a time so only the offending ones are marked failed.
    pub async fn run_once(&self) -> Result<BackfillPass, MarqueeError> {
        let pending = self.store.pending_embeddings(self.batch_size)?;
        let mut pass = BackfillPass::default();
        if pending.is_empty() {
            return Ok(pass);
        }

        let texts: Vec<String> = pending.iter().map(|doc| doc.text.clone()).collect();
        type Embedded = Result<Vec<f32>, MarqueeError>;
        let vectors: Vec<Embedded> = match self.embedder.embed_batch_boxed(&texts).await {
            Ok(vectors) if vectors.len() == pending.len() => vectors.into_iter().map(Ok).collect(),
            Ok(vectors) => {
                warn!(
                    expected = pending.len(),
                    got = vectors.len(),
                    "Embedding batch size mismatch, retrying documents one by one"
                );
                self.embed_each(&texts).await
            }
            Err(e) => {
                debug!(error = %e, "Embedding batch failed, retrying documents one by one");
                self.embed_each(&texts).await
            }
        };

        for (doc, vector) in pending.iter().zip(vectors) {
            let result = vector.and_then(|v| self.store.set_embedding(&doc.id, &v));
            match result {
                Ok(()) => pass.embedded += 1,
                Err(MarqueeError::StoreUnavailable(reason)) => {
                    return Err(MarqueeError::StoreUnavailable(reason));
                }
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Embedding failed, skipping document");
                    self.store.mark_embedding_failed(&doc.id)?;
                    pass.failed += 1;
                }
            }
        }

        if pass.processed() > 0 {
            debug!(embedded = pass.embedded, failed = pass.failed, "Backfill pass");
        }
        Ok(pass)
    }

    async fn embed_each(&self, texts: &[String]) -> Vec<Result<Vec<f32>, MarqueeError>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embedder.embed_boxed(text).await);
        }
        vectors
    }

    /// Run passes forever, sleeping whenever nothing is pending.
    pub async fn run(self) {
        info!(
            batch_size = self.batch_size,
            idle_ms = self.idle_interval.as_millis() as u64,
            "Embedding backfill started"
        );

        let mut was_idle = false;
        loop {
            match self.run_once().await {
                Ok(pass) if pass.processed() > 0 => {
                    was_idle = false;
                    continue;
                }
                Ok(_) => {
                    if !was_idle {
                        let embedded = self.store.embedded_count().unwrap_or(0);
                        info!(embedded, "Embedding backfill idle");
                        was_idle = true;
                    }
                }
                Err(e) => warn!(error = %e, "Embedding backfill pass failed"),
            }
            tokio::time::sleep(self.idle_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingService, HashEmbedding};
    use crate::testing::FailingStore;
    use marquee_core::schema::Schema;
    use marquee_core::types::Movie;
    use marquee_storage::SqliteCatalog;

    fn movie(id: &str, extract: &str) -> Movie {
        Movie {
            id: id.to_string(),
            title: id.to_string(),
            year: 2000,
            extract: extract.to_string(),
            ..Default::default()
        }
    }

    fn setup(dim: usize) -> (Arc<SqliteCatalog>, EmbeddingBackfill) {
        let store = Arc::new(SqliteCatalog::in_memory(Schema::movies(8)).unwrap());
        let backfill = EmbeddingBackfill::new(
            store.clone(),
            Arc::new(HashEmbedding::new(dim)),
            2,
            Duration::from_millis(10),
        );
        (store, backfill)
    }

    #[tokio::test]
    async fn test_backfill_embeds_in_batches() {
        let (store, backfill) = setup(8);
        store
            .save_all(&[movie("a", "one"), movie("b", "two"), movie("c", "three")])
            .unwrap();

        let first = backfill.run_once().await.unwrap();
        assert_eq!(first, BackfillPass { embedded: 2, failed: 0 });
        let second = backfill.run_once().await.unwrap();
        assert_eq!(second.embedded, 1);
        let third = backfill.run_once().await.unwrap();
        assert_eq!(third.processed(), 0);

        assert_eq!(store.embedded_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_backfill_uses_same_vector_as_query_embedding() {
        let (store, backfill) = setup(8);
        store.save_all(&[movie("a", "a heist in space")]).unwrap();
        backfill.run_once().await.unwrap();

        let query = HashEmbedding::new(8).embed("a heist in space").await.unwrap();
        let hits = store
            .query(&marquee_storage::MovieQuery::new().nearest(
                marquee_core::schema::EMBEDDED_EXTRACT,
                query,
                1,
            ))
            .unwrap();
        assert!(hits[0].score.unwrap().abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failed_embedding_is_marked_and_skipped() {
        // Vectors of the wrong dimension are rejected by the store.
        let (store, backfill) = setup(4);
        store.save_all(&[movie("a", "one")]).unwrap();

        let pass = backfill.run_once().await.unwrap();
        assert_eq!(pass, BackfillPass { embedded: 0, failed: 1 });
        assert!(store.pending_embeddings(10).unwrap().is_empty());
        assert_eq!(store.embedded_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_text_fails_only_its_document() {
        let (store, backfill) = setup(8);
        let mut blank = movie("blank", " ");
        blank.title = " ".to_string();
        store.save_all(&[movie("a", "one"), blank]).unwrap();

        let pass = backfill.run_once().await.unwrap();
        assert_eq!(pass, BackfillPass { embedded: 1, failed: 1 });
        assert_eq!(store.embedded_count().unwrap(), 1);
        assert!(store.pending_embeddings(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let backfill = EmbeddingBackfill::new(
            Arc::new(FailingStore),
            Arc::new(HashEmbedding::new(8)),
            10,
            Duration::from_millis(10),
        );
        assert!(matches!(
            backfill.run_once().await,
            Err(MarqueeError::StoreUnavailable(_))
        ));
    }
}
