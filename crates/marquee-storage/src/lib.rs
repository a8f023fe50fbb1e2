//! Marquee Storage crate - SQLite-backed catalog store.
//!
//! Provides a WAL-mode SQLite database whose tables are generated from the
//! declarative index schema, a predicate query builder with a single SQL
//! translation step, and the [`CatalogStore`] implementation used by the
//! ingestion pipeline, the embedding backfill, and the search engine.

pub mod db;
pub mod migrations;
pub mod query;
pub mod repository;
pub mod store;
pub mod vector;

pub use db::Database;
pub use query::{Knn, MovieQuery, Predicate, SqlQuery};
pub use repository::SqliteCatalog;
pub use store::CatalogStore;
