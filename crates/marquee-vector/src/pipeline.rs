//! Catalog ingestion pipeline.
//!
//! The MovieLoader reads the JSON catalog, applies the load policy of the
//! deployment mode, and writes the survivors to the store in fixed-size
//! batches. Embeddings are not computed here; the backfill worker fills them
//! in after documents land.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use marquee_core::config::{IngestConfig, SearchMode};
use marquee_core::error::MarqueeError;
use marquee_core::types::Movie;
use marquee_storage::CatalogStore;

/// How the catalog is filtered and keyed on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Key by title, skip titles already stored, skip movies released in or
    /// before `cutoff_year`. Source order is kept.
    Deduplicating { cutoff_year: i32 },
    /// Key by a generated id and save the whole catalog in reverse source
    /// order. Callers guard against reloading a non-empty store.
    ReverseAll,
}

impl LoadPolicy {
    /// The policy used by a deployment mode.
    pub fn for_mode(mode: SearchMode, cutoff_year: i32) -> Self {
        match mode {
            SearchMode::Vector => LoadPolicy::Deduplicating { cutoff_year },
            SearchMode::FullText => LoadPolicy::ReverseAll,
        }
    }
}

/// Outcome of a load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    /// Documents written.
    pub saved: usize,
    /// Documents written per batch, in write order.
    pub batches: Vec<usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Loads the movie catalog into a [`CatalogStore`].
pub struct MovieLoader {
    store: Arc<dyn CatalogStore>,
    policy: LoadPolicy,
    batch_size: usize,
}

impl MovieLoader {
    /// Create a loader. `batch_size` must be at least 1.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        policy: LoadPolicy,
        batch_size: usize,
    ) -> Result<Self, MarqueeError> {
        if batch_size == 0 {
            return Err(MarqueeError::Config(
                "Batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store,
            policy,
            batch_size,
        })
    }

    /// Create a loader for a deployment mode from the ingest settings.
    pub fn from_config(
        store: Arc<dyn CatalogStore>,
        mode: SearchMode,
        config: &IngestConfig,
    ) -> Result<Self, MarqueeError> {
        Self::new(
            store,
            LoadPolicy::for_mode(mode, config.cutoff_year),
            config.batch_size,
        )
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Read and load the catalog at `path`.
    pub fn load(&self, path: &Path) -> Result<LoadReport, MarqueeError> {
        let movies = read_catalog(path)?;
        info!(
            path = %path.display(),
            records = movies.len(),
            "Read movie catalog"
        );
        self.load_movies(movies)
    }

    /// Filter, key, and write already-parsed catalog records.
    ///
    /// A failing batch aborts the load; batches written before it stay.
    pub fn load_movies(&self, movies: Vec<Movie>) -> Result<LoadReport, MarqueeError> {
        let start = Instant::now();
        let candidates = self.select(movies)?;

        let mut batches = Vec::new();
        for (n, batch) in candidates.chunks(self.batch_size).enumerate() {
            let written = self.store.save_all(batch)?;
            debug!(batch = n + 1, written, "Batch saved");
            batches.push(written);
        }

        let report = LoadReport {
            saved: batches.iter().sum(),
            batches,
            elapsed: start.elapsed(),
        };
        info!(
            saved = report.saved,
            batches = report.batches.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Catalog load finished"
        );
        Ok(report)
    }

    /// Apply the load policy, assigning ids.
    fn select(&self, movies: Vec<Movie>) -> Result<Vec<Movie>, MarqueeError> {
        match self.policy {
            LoadPolicy::Deduplicating { cutoff_year } => {
                let mut seen = HashSet::new();
                let mut selected = Vec::new();
                for mut movie in movies {
                    let id = movie.title.trim().to_string();
                    if id.is_empty() || movie.year <= cutoff_year {
                        continue;
                    }
                    if seen.contains(&id) || self.store.exists_by_id(&id)? {
                        continue;
                    }
                    seen.insert(id.clone());
                    movie.id = id;
                    selected.push(movie);
                }
                Ok(selected)
            }
            LoadPolicy::ReverseAll => Ok(movies
                .into_iter()
                .rev()
                .map(|mut movie| {
                    movie.id = Uuid::new_v4().to_string();
                    movie
                })
                .collect()),
        }
    }
}

/// Parse the JSON catalog: an array of movie records.
pub fn read_catalog(path: &Path) -> Result<Vec<Movie>, MarqueeError> {
    let content = std::fs::read_to_string(path).map_err(|e| MarqueeError::SourceUnavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| {
        MarqueeError::MalformedInput(format!("{}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingStore;
    use marquee_core::schema::Schema;
    use marquee_storage::{MovieQuery, SqliteCatalog};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn store() -> Arc<dyn CatalogStore> {
        Arc::new(SqliteCatalog::in_memory(Schema::movies(8)).unwrap())
    }

    fn record(title: &str, year: i32) -> Movie {
        Movie {
            title: title.to_string(),
            year,
            genres: vec!["Drama".to_string()],
            extract: format!("About {}.", title),
            ..Default::default()
        }
    }

    fn catalog_file(movies: &[Movie]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(movies).unwrap().as_bytes())
            .unwrap();
        file
    }

    fn dedup(store: Arc<dyn CatalogStore>, batch_size: usize) -> MovieLoader {
        MovieLoader::new(store, LoadPolicy::Deduplicating { cutoff_year: 1980 }, batch_size)
            .unwrap()
    }

    #[test]
    fn test_load_is_idempotent() {
        let store = store();
        let file = catalog_file(&[record("A", 2001), record("B", 1975), record("C", 1999)]);
        let loader = dedup(store.clone(), 500);

        let first = loader.load(file.path()).unwrap();
        assert_eq!(first.saved, 2);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.exists_by_id("A").unwrap());
        assert!(store.exists_by_id("C").unwrap());
        assert!(!store.exists_by_id("B").unwrap());

        let second = loader.load(file.path()).unwrap();
        assert_eq!(second.saved, 0);
        assert!(second.batches.is_empty());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_load_from_file_keeps_only_post_cutoff_movies() {
        let store = store();
        let file = catalog_file(&[
            record("Jaws", 1975),
            record("Goodfellas", 1990),
            record("Memento", 2001),
        ]);

        let report = dedup(store.clone(), 500).load(file.path()).unwrap();
        assert_eq!(report.saved, 2);
        assert_eq!(report.batches, vec![2]);

        let hits = store.query(&MovieQuery::new()).unwrap();
        let mut years: Vec<i32> = hits.iter().map(|h| h.movie.year).collect();
        years.sort_unstable();
        assert_eq!(years, vec![1990, 2001]);
        assert!(hits.iter().all(|h| h.movie.year > 1980));
    }

    #[test]
    fn test_cutoff_year_is_exclusive() {
        let store = store();
        let loader = dedup(store.clone(), 500);
        let report = loader
            .load_movies(vec![record("Old", 1980), record("New", 1981)])
            .unwrap();

        assert_eq!(report.saved, 1);
        assert!(store.exists_by_id("New").unwrap());
        assert!(!store.exists_by_id("Old").unwrap());
    }

    #[test]
    fn test_duplicate_titles_in_source_saved_once() {
        let store = store();
        let report = dedup(store.clone(), 500)
            .load_movies(vec![record("Twin", 2000), record("Twin", 2010)])
            .unwrap();

        assert_eq!(report.saved, 1);
        let hits = store.query(&MovieQuery::new()).unwrap();
        assert_eq!(hits[0].movie.year, 2000);
    }

    #[test]
    fn test_batches_cover_every_candidate() {
        let store = store();
        let movies: Vec<Movie> = (0..1203).map(|i| record(&format!("Movie {}", i), 2000)).collect();
        let report = dedup(store.clone(), 500).load_movies(movies).unwrap();

        assert_eq!(report.batches, vec![500, 500, 203]);
        assert_eq!(report.saved, 1203);
        assert_eq!(store.count().unwrap(), 1203);
    }

    #[test]
    fn test_partial_reload_writes_only_new_titles() {
        let store = store();
        let loader = dedup(store.clone(), 2);
        loader
            .load_movies(vec![record("A", 2000), record("B", 2000)])
            .unwrap();

        let report = loader
            .load_movies(vec![record("A", 2000), record("C", 2000), record("B", 2000)])
            .unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_reverse_all_keeps_everything_with_generated_ids() {
        let store = store();
        let loader = MovieLoader::new(store.clone(), LoadPolicy::ReverseAll, 500).unwrap();
        let report = loader
            .load_movies(vec![record("First", 1950), record("Second", 2000), record("First", 1950)])
            .unwrap();

        assert_eq!(report.saved, 3);
        let hits = store.query(&MovieQuery::new()).unwrap();
        assert_eq!(hits.len(), 3);
        for hit in &hits {
            assert!(Uuid::parse_str(&hit.movie.id).is_ok());
        }
    }

    #[test]
    fn test_reverse_all_writes_in_reverse_order() {
        let recorder = Arc::new(crate::testing::RecordingStore::default());
        let loader = MovieLoader::new(recorder.clone(), LoadPolicy::ReverseAll, 2).unwrap();
        loader
            .load_movies(vec![record("One", 2000), record("Two", 2000), record("Three", 2000)])
            .unwrap();

        assert_eq!(recorder.saved_titles(), vec!["Three", "Two", "One"]);
        assert_eq!(recorder.batch_sizes(), vec![2, 1]);
    }

    #[test]
    fn test_missing_source() {
        let loader = dedup(store(), 500);
        let err = loader.load(Path::new("/nonexistent/movies.json")).unwrap_err();
        assert!(matches!(err, MarqueeError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_malformed_source() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[{\"title\": \"Broken\",").unwrap();

        let store = store();
        let err = dedup(store.clone(), 500).load(file.path()).unwrap_err();
        assert!(matches!(err, MarqueeError::MalformedInput(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_store_failure_aborts_load() {
        let loader = MovieLoader::new(Arc::new(FailingStore), LoadPolicy::ReverseAll, 10).unwrap();
        let err = loader.load_movies(vec![record("A", 2000)]).unwrap_err();
        assert!(matches!(err, MarqueeError::StoreUnavailable(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            MovieLoader::new(store(), LoadPolicy::ReverseAll, 0),
            Err(MarqueeError::Config(_))
        ));
    }

    #[test]
    fn test_policy_for_mode() {
        assert_eq!(
            LoadPolicy::for_mode(SearchMode::Vector, 1980),
            LoadPolicy::Deduplicating { cutoff_year: 1980 }
        );
        assert_eq!(LoadPolicy::for_mode(SearchMode::FullText, 1980), LoadPolicy::ReverseAll);
    }
}
