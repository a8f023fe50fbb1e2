//! Hybrid search over the movie catalog.
//!
//! HybridSearchEngine composes the structured filters of a request into one
//! [`MovieQuery`]. In vector mode the similarity text is embedded and added
//! as a KNN clause, so results come back ordered by ascending cosine
//! distance with the distance as score. Otherwise results are ordered by
//! year and carry no score.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use marquee_core::config::{SearchConfig, SearchMode};
use marquee_core::error::MarqueeError;
use marquee_core::schema::{CAST, EMBEDDED_EXTRACT, EXTRACT, GENRES, TITLE, YEAR};
use marquee_core::types::{ScoredMovie, Suggestion};
use marquee_storage::{CatalogStore, MovieQuery};

use crate::embedding::DynEmbeddingService;

/// Parameters of a catalog search. Absent or blank values impose no
/// constraint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Substring of the title.
    pub title: Option<String>,
    /// Similarity text (vector mode) or extract substring (full-text mode).
    pub text: Option<String>,
    /// Every listed cast member must appear.
    pub cast: Vec<String>,
    /// Exact release year.
    pub year: Option<i32>,
    /// Every listed genre must appear.
    pub genres: Vec<String>,
    /// Neighbors kept by the similarity ranking.
    pub neighbors: Option<i64>,
}

/// Search results and timing.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<ScoredMovie>,
    pub count: usize,
    pub elapsed: Duration,
}

/// Autocomplete results and timing.
#[derive(Debug, Clone)]
pub struct SuggestOutcome {
    pub suggestions: Vec<Suggestion>,
    pub elapsed: Duration,
}

/// Distinct genres and timing.
#[derive(Debug, Clone)]
pub struct GenresOutcome {
    pub genres: BTreeSet<String>,
    pub elapsed: Duration,
}

/// Query engine over a [`CatalogStore`].
///
/// Performs no readiness gating; callers decide whether to serve.
pub struct HybridSearchEngine {
    store: Arc<dyn CatalogStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    mode: SearchMode,
    config: SearchConfig,
}

impl HybridSearchEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        mode: SearchMode,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            mode,
            config,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Run a search.
    ///
    /// Elapsed time covers filtering, ordering, and materializing results;
    /// embedding the similarity text is not included.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, MarqueeError> {
        info!(
            title = request.title.as_deref().unwrap_or(""),
            text = request.text.as_deref().unwrap_or(""),
            cast = ?request.cast,
            year = request.year,
            genres = ?request.genres,
            neighbors = request.neighbors,
            mode = %self.mode,
            "Searching movies"
        );

        let mut query = MovieQuery::new()
            .containing(TITLE, request.title.as_deref())
            .tags_eq(CAST, &request.cast)
            .numeric_eq(YEAR, request.year.map(i64::from))
            .tags_eq(GENRES, &request.genres)
            .sorted_by(YEAR);

        let text = request.text.as_deref().filter(|t| !t.trim().is_empty());
        match (self.mode, text) {
            (SearchMode::Vector, Some(text)) => {
                let k = self.neighbors(request.neighbors)?;
                let vector = self.embedder.embed_boxed(text).await?;
                query = query.nearest(EMBEDDED_EXTRACT, vector, k);
            }
            (SearchMode::FullText, Some(text)) => {
                query = query.containing(EXTRACT, Some(text));
            }
            (_, None) => {}
        }

        let start = Instant::now();
        let results = self.store.query(&query)?;
        let elapsed = start.elapsed();

        info!(
            count = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Search finished"
        );
        Ok(SearchOutcome {
            count: results.len(),
            results,
            elapsed,
        })
    }

    /// Title suggestions for a prefix.
    pub fn suggest(&self, prefix: &str) -> Result<SuggestOutcome, MarqueeError> {
        let start = Instant::now();
        let suggestions = self
            .store
            .suggest(TITLE, prefix, self.config.suggestion_limit)?;
        let elapsed = start.elapsed();

        info!(
            prefix,
            count = suggestions.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Autocomplete"
        );
        Ok(SuggestOutcome {
            suggestions,
            elapsed,
        })
    }

    /// Every distinct genre in the catalog, sorted.
    pub fn all_genres(&self) -> Result<GenresOutcome, MarqueeError> {
        let start = Instant::now();
        let genres: BTreeSet<String> = self.store.tag_values(GENRES)?.into_iter().collect();
        let elapsed = start.elapsed();

        info!(
            count = genres.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Fetched genres"
        );
        Ok(GenresOutcome { genres, elapsed })
    }

    /// Resolve the neighbor count of a similarity query.
    fn neighbors(&self, requested: Option<i64>) -> Result<usize, MarqueeError> {
        let Some(k) = requested else {
            return Ok(self.config.default_neighbors);
        };
        if k <= 0 {
            return Err(MarqueeError::Validation(format!(
                "numberOfNearestNeighbors must be positive, got {}",
                k
            )));
        }
        if k as u64 > self.config.max_neighbors as u64 {
            return Err(MarqueeError::Validation(format!(
                "numberOfNearestNeighbors must be at most {}, got {}",
                self.config.max_neighbors, k
            )));
        }
        Ok(k as usize)
    }
}
