//! SQLite implementation of [`CatalogStore`].

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::debug;

use marquee_core::error::MarqueeError;
use marquee_core::schema::{self, Schema};
use marquee_core::types::{Movie, PendingEmbedding, ScoredMovie, Suggestion};

use crate::db::{store_err, Database};
use crate::query::{translate, MovieQuery};
use crate::store::CatalogStore;
use crate::vector;

const UPSERT_MOVIE: &str = "
    INSERT INTO movies (id, title, year, cast_list, genre_list, extract, href, thumbnail,
                        thumbnail_width, thumbnail_height, title_folded, extract_folded)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        title_folded = excluded.title_folded,
        extract_folded = excluded.extract_folded,
        year = excluded.year,
        cast_list = excluded.cast_list,
        genre_list = excluded.genre_list,
        extract = excluded.extract,
        href = excluded.href,
        thumbnail = excluded.thumbnail,
        thumbnail_width = excluded.thumbnail_width,
        thumbnail_height = excluded.thumbnail_height,
        embedded_extract = NULL,
        embedding_failed = 0";

/// Movie catalog backed by the SQLite [`Database`].
pub struct SqliteCatalog {
    db: Arc<Database>,
    schema: Schema,
}

impl SqliteCatalog {
    /// Wrap a database opened with the same `schema`.
    pub fn new(db: Arc<Database>, schema: Schema) -> Result<Self, MarqueeError> {
        schema.vector_field()?;
        Ok(Self { db, schema })
    }

    /// A catalog over a fresh in-memory database.
    pub fn in_memory(schema: Schema) -> Result<Self, MarqueeError> {
        let db = Arc::new(Database::in_memory(&schema)?);
        Self::new(db, schema)
    }
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog")
            .field("index", &self.schema.index_name)
            .finish()
    }
}

impl CatalogStore for SqliteCatalog {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn exists_by_id(&self, id: &str) -> Result<bool, MarqueeError> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM movies WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(store_err("Failed to check movie"))?;
            Ok(found.is_some())
        })
    }

    fn save_all(&self, movies: &[Movie]) -> Result<usize, MarqueeError> {
        if movies.is_empty() {
            return Ok(0);
        }

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(store_err("Failed to begin batch"))?;
            {
                let mut upsert = tx
                    .prepare_cached(UPSERT_MOVIE)
                    .map_err(store_err("Failed to prepare upsert"))?;
                let mut clear_tags = tx
                    .prepare_cached("DELETE FROM movie_tags WHERE movie_id = ?1")
                    .map_err(store_err("Failed to prepare tag cleanup"))?;
                let mut insert_tag = tx
                    .prepare_cached(
                        "INSERT INTO movie_tags (movie_id, field, position, value)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(store_err("Failed to prepare tag insert"))?;
                let mut clear_suggestions = tx
                    .prepare_cached("DELETE FROM suggestions WHERE movie_id = ?1")
                    .map_err(store_err("Failed to prepare suggestion cleanup"))?;
                let mut insert_suggestion = tx
                    .prepare_cached(
                        "INSERT INTO suggestions (movie_id, field, text, folded, score, payload)
                         VALUES (?1, ?2, ?3, ?4, 1.0, ?5)",
                    )
                    .map_err(store_err("Failed to prepare suggestion insert"))?;

                for movie in movies {
                    if movie.id.is_empty() {
                        return Err(MarqueeError::Validation(format!(
                            "Movie '{}' has no id",
                            movie.title
                        )));
                    }

                    upsert
                        .execute(rusqlite::params![
                            movie.id,
                            movie.title,
                            movie.year,
                            serde_json::to_string(&movie.cast)?,
                            serde_json::to_string(&movie.genres)?,
                            movie.extract,
                            movie.href,
                            movie.thumbnail,
                            movie.thumbnail_width,
                            movie.thumbnail_height,
                            movie.title.to_lowercase(),
                            movie.extract.to_lowercase(),
                        ])
                        .map_err(store_err("Failed to save movie"))?;

                    clear_tags
                        .execute(rusqlite::params![movie.id])
                        .map_err(store_err("Failed to clear tags"))?;
                    for field in self.schema.tag_fields() {
                        for (position, value) in tags_of(movie, field.name).iter().enumerate() {
                            insert_tag
                                .execute(rusqlite::params![
                                    movie.id,
                                    field.name,
                                    position as i64,
                                    value
                                ])
                                .map_err(store_err("Failed to save tag"))?;
                        }
                    }

                    clear_suggestions
                        .execute(rusqlite::params![movie.id])
                        .map_err(store_err("Failed to clear suggestions"))?;
                    for field in self.schema.autocomplete_fields() {
                        let Some(text) = text_of(movie, field.name) else {
                            continue;
                        };
                        if text.trim().is_empty() {
                            continue;
                        }
                        let payload = serde_json::json!({
                            "id": movie.id,
                            "year": movie.year,
                            "thumbnail": movie.thumbnail,
                        });
                        insert_suggestion
                            .execute(rusqlite::params![
                                movie.id,
                                field.name,
                                text,
                                text.to_lowercase(),
                                payload.to_string(),
                            ])
                            .map_err(store_err("Failed to save suggestion"))?;
                    }
                }
            }
            tx.commit().map_err(store_err("Failed to commit batch"))?;
            debug!(count = movies.len(), "Saved movie batch");
            Ok(movies.len())
        })
    }

    fn count(&self) -> Result<u64, MarqueeError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))
                .map_err(store_err("Failed to count movies"))?;
            Ok(count as u64)
        })
    }

    fn query(&self, query: &MovieQuery) -> Result<Vec<ScoredMovie>, MarqueeError> {
        let sql = translate(query, &self.schema)?;

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql.sql)
                .map_err(store_err("Failed to prepare query"))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(sql.params.iter()), |row| {
                    Ok(row_to_hit(row, sql.vector_column))
                })
                .map_err(store_err("Failed to run query"))?;

            let mut hits = Vec::new();
            for row in rows {
                hits.push(row.map_err(store_err("Failed to read query row"))??);
            }
            Ok(hits)
        })?;

        let Some(knn) = &query.knn else {
            return Ok(rows
                .into_iter()
                .map(|(movie, _)| ScoredMovie { movie, score: None })
                .collect());
        };

        let candidates = rows
            .into_iter()
            .filter_map(|(movie, v)| v.map(|v| (movie.id.clone(), v, movie)))
            .collect();
        Ok(vector::nearest(&knn.vector, candidates, knn.k)
            .into_iter()
            .map(|(distance, movie)| ScoredMovie {
                movie,
                score: Some(distance),
            })
            .collect())
    }

    fn suggest(
        &self,
        field: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>, MarqueeError> {
        let spec = self.schema.field(field)?;
        if !spec.autocomplete {
            return Err(MarqueeError::Schema(format!(
                "Field '{}' has no suggestion dictionary",
                field
            )));
        }
        if prefix.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT text, payload FROM suggestions
                     WHERE field = ?1 AND folded LIKE ?2 ESCAPE '\\'
                     ORDER BY score DESC, length(text) ASC, text ASC
                     LIMIT ?3",
                )
                .map_err(store_err("Failed to prepare suggestion lookup"))?;
            let rows = stmt
                .query_map(rusqlite::params![spec.name, pattern, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(store_err("Failed to look up suggestions"))?;

            let mut suggestions = Vec::new();
            for row in rows {
                let (text, payload) = row.map_err(store_err("Failed to read suggestion"))?;
                suggestions.push(Suggestion {
                    text,
                    payload: serde_json::from_str(&payload)?,
                });
            }
            Ok(suggestions)
        })
    }

    fn tag_values(&self, field: &str) -> Result<Vec<String>, MarqueeError> {
        let spec = self.schema.field(field)?;
        if spec.index != schema::IndexKind::Tag {
            return Err(MarqueeError::Schema(format!(
                "Field '{}' is not a tag field",
                field
            )));
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT value FROM movie_tags WHERE field = ?1 ORDER BY movie_id, position",
                )
                .map_err(store_err("Failed to prepare tag scan"))?;
            let rows = stmt
                .query_map(rusqlite::params![spec.name], |row| row.get::<_, String>(0))
                .map_err(store_err("Failed to scan tags"))?;

            let mut values = Vec::new();
            for row in rows {
                values.push(row.map_err(store_err("Failed to read tag"))?);
            }
            Ok(values)
        })
    }

    fn pending_embeddings(&self, limit: usize) -> Result<Vec<PendingEmbedding>, MarqueeError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, title, extract FROM movies
                     WHERE embedded_extract IS NULL AND embedding_failed = 0
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?1",
                )
                .map_err(store_err("Failed to prepare pending scan"))?;
            let rows = stmt
                .query_map(rusqlite::params![limit as i64], |row| {
                    Ok(Movie {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        extract: row.get(2)?,
                        ..Default::default()
                    })
                })
                .map_err(store_err("Failed to scan pending embeddings"))?;

            let mut pending = Vec::new();
            for row in rows {
                let movie = row.map_err(store_err("Failed to read pending embedding"))?;
                pending.push(PendingEmbedding {
                    text: movie.embedding_source().to_string(),
                    id: movie.id,
                });
            }
            Ok(pending)
        })
    }

    fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<(), MarqueeError> {
        let (_, spec) = self.schema.vector_field()?;
        if vector.len() != spec.dimension {
            return Err(MarqueeError::Validation(format!(
                "Embedding for '{}' has dimension {}, expected {}",
                id,
                vector.len(),
                spec.dimension
            )));
        }

        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE movies SET embedded_extract = ?1, embedding_failed = 0 WHERE id = ?2",
                    rusqlite::params![vector::encode(vector), id],
                )
                .map_err(store_err("Failed to save embedding"))?;
            if updated == 0 {
                return Err(MarqueeError::Validation(format!("No movie with id '{}'", id)));
            }
            Ok(())
        })
    }

    fn mark_embedding_failed(&self, id: &str) -> Result<(), MarqueeError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE movies SET embedding_failed = 1 WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(store_err("Failed to mark embedding failure"))?;
            Ok(())
        })
    }

    fn embedded_count(&self) -> Result<u64, MarqueeError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM movies WHERE embedded_extract IS NOT NULL",
                    [],
                    |row| row.get(0),
                )
                .map_err(store_err("Failed to count embeddings"))?;
            Ok(count as u64)
        })
    }
}

fn tags_of<'a>(movie: &'a Movie, field: &str) -> &'a [String] {
    match field {
        schema::CAST => &movie.cast,
        schema::GENRES => &movie.genres,
        _ => &[],
    }
}

fn text_of<'a>(movie: &'a Movie, field: &str) -> Option<&'a str> {
    match field {
        schema::TITLE => Some(&movie.title),
        schema::EXTRACT => Some(&movie.extract),
        _ => None,
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert a result row into a movie and, when selected, its vector.
fn row_to_hit(
    row: &rusqlite::Row<'_>,
    vector_column: Option<&str>,
) -> Result<(Movie, Option<Vec<f32>>), MarqueeError> {
    let read = store_err("Failed to read movie row");

    let cast: String = row.get("cast_list").map_err(&read)?;
    let genres: String = row.get("genre_list").map_err(&read)?;
    let movie = Movie {
        id: row.get("id").map_err(&read)?,
        title: row.get("title").map_err(&read)?,
        year: row.get("year").map_err(&read)?,
        cast: serde_json::from_str(&cast)?,
        genres: serde_json::from_str(&genres)?,
        extract: row.get("extract").map_err(&read)?,
        href: row.get("href").map_err(&read)?,
        thumbnail: row.get("thumbnail").map_err(&read)?,
        thumbnail_width: row.get("thumbnail_width").map_err(&read)?,
        thumbnail_height: row.get("thumbnail_height").map_err(&read)?,
    };

    let vector = match vector_column {
        Some(column) => {
            let blob: Option<Vec<u8>> = row.get(column).map_err(&read)?;
            blob.map(|b| vector::decode(&b)).transpose()?
        }
        None => None,
    };

    Ok((movie, vector))
}
