//! Marquee Vector crate - embeddings, catalog ingestion, readiness, and search.
//!
//! Provides the embedding service trait with ONNX and hash-based backends,
//! the background embedding backfill, the batch catalog loader, the
//! readiness gate, and the hybrid search engine.

pub mod backfill;
pub mod embedding;
pub mod pipeline;
pub mod readiness;
pub mod search;

#[cfg(test)]
mod testing;

pub use backfill::{BackfillPass, EmbeddingBackfill};
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding, OnnxEmbeddingService};
pub use pipeline::{LoadPolicy, LoadReport, MovieLoader};
pub use readiness::{AlwaysReady, CountThresholdReadiness, ReadinessTracker};
pub use search::{GenresOutcome, HybridSearchEngine, SearchOutcome, SearchRequest, SuggestOutcome};
