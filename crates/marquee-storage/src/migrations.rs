//! Database schema migrations.
//!
//! Version 1 creates the catalog tables from the declarative [`Schema`]:
//! one column per field on `movies` (plus a lowercased `<column>_folded` copy
//! of every text-indexed field), a `movie_tags` row per tag value, and a
//! `suggestions` dictionary for every autocomplete field. The schema
//! definition is recorded in `index_definitions` so a database created with
//! one vector dimension cannot be reopened with another.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use marquee_core::error::MarqueeError;
use marquee_core::schema::{FieldType, IndexKind, Schema};

use crate::db::store_err;

pub const MOVIES_TABLE: &str = "movies";
pub const TAGS_TABLE: &str = "movie_tags";
pub const SUGGESTIONS_TABLE: &str = "suggestions";

/// Column holding the case-folded copy of a text field.
///
/// SQLite's `lower()` only folds ASCII, so substring filters match against
/// text folded in Rust at write time.
pub fn folded_column(column: &str) -> String {
    format!("{}_folded", column)
}

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection, schema: &Schema) -> Result<(), MarqueeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(store_err("Failed to create migrations table"))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(store_err("Failed to query migration version"))?;

    if current_version < 1 {
        apply_v1(conn, schema)?;
        info!(index = schema.index_name, "Applied migration v1: catalog_schema");
    }

    check_definition(conn, schema)
}

/// Version 1: catalog tables generated from the schema.
fn apply_v1(conn: &Connection, schema: &Schema) -> Result<(), MarqueeError> {
    let definition = serde_json::to_string(schema)?;
    let ddl = catalog_ddl(schema)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(store_err("Failed to begin migration"))?;
    tx.execute_batch(&ddl)
        .map_err(store_err("Failed to apply v1 schema"))?;
    tx.execute(
        "INSERT INTO index_definitions (index_name, definition) VALUES (?1, ?2)",
        rusqlite::params![schema.index_name, definition],
    )
    .map_err(store_err("Failed to record index definition"))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (1, 'catalog_schema')",
        [],
    )
    .map_err(store_err("Failed to record migration"))?;
    tx.commit().map_err(store_err("Failed to commit migration"))?;
    Ok(())
}

/// Build the DDL for the catalog tables.
fn catalog_ddl(schema: &Schema) -> Result<String, MarqueeError> {
    let mut columns = Vec::with_capacity(schema.fields.len() + 2);
    let mut indexes = Vec::new();

    for field in &schema.fields {
        let column = if field.name == schema.key {
            format!("{} TEXT PRIMARY KEY NOT NULL", field.column)
        } else {
            match field.ty {
                FieldType::String if field.index == IndexKind::None => {
                    format!("{} TEXT", field.column)
                }
                FieldType::String => format!("{} TEXT NOT NULL DEFAULT ''", field.column),
                FieldType::Integer if field.index == IndexKind::None => {
                    format!("{} INTEGER", field.column)
                }
                FieldType::Integer => format!("{} INTEGER NOT NULL DEFAULT 0", field.column),
                FieldType::StringList => format!("{} TEXT NOT NULL DEFAULT '[]'", field.column),
                FieldType::Vector => format!("{} BLOB", field.column),
            }
        };
        columns.push(column);
        if field.index == IndexKind::Text {
            columns.push(format!("{} TEXT NOT NULL DEFAULT ''", folded_column(field.column)));
        }

        match field.index {
            IndexKind::Numeric { sortable: true } => indexes.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table} ({col} ASC);",
                table = MOVIES_TABLE,
                col = field.column
            )),
            IndexKind::Vector(spec) if field.ty != FieldType::Vector || spec.dimension == 0 => {
                return Err(MarqueeError::Schema(format!(
                    "Vector field '{}' needs a vector type and a non-zero dimension",
                    field.name
                )));
            }
            IndexKind::Tag if field.ty != FieldType::StringList => {
                return Err(MarqueeError::Schema(format!(
                    "Tag field '{}' must hold a list of strings",
                    field.name
                )));
            }
            _ => {}
        }
    }

    let (vector_field, _) = schema.vector_field()?;
    columns.push("embedding_failed INTEGER NOT NULL DEFAULT 0".to_string());
    columns.push("created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))".to_string());
    indexes.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_pending ON {table} (embedding_failed)
            WHERE {col} IS NULL;",
        table = MOVIES_TABLE,
        col = vector_field.column
    ));

    Ok(format!(
        "
        CREATE TABLE IF NOT EXISTS index_definitions (
            index_name  TEXT PRIMARY KEY NOT NULL,
            definition  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {movies} (
            {columns}
        );

        {indexes}

        -- One row per value of every tag field, in list order.
        CREATE TABLE IF NOT EXISTS {tags} (
            movie_id    TEXT NOT NULL,
            field       TEXT NOT NULL,
            position    INTEGER NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (movie_id, field, position),
            FOREIGN KEY (movie_id) REFERENCES {movies}({key}) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_{tags}_value
            ON {tags} (field, value);

        -- Autocomplete dictionary.
        CREATE TABLE IF NOT EXISTS {suggestions} (
            movie_id    TEXT NOT NULL,
            field       TEXT NOT NULL,
            text        TEXT NOT NULL,
            folded      TEXT NOT NULL,
            score       REAL NOT NULL DEFAULT 1.0,
            payload     TEXT NOT NULL DEFAULT '{{}}',
            PRIMARY KEY (movie_id, field),
            FOREIGN KEY (movie_id) REFERENCES {movies}({key}) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_{suggestions}_folded
            ON {suggestions} (field, folded);
        ",
        movies = MOVIES_TABLE,
        tags = TAGS_TABLE,
        suggestions = SUGGESTIONS_TABLE,
        key = schema.key,
        columns = columns.join(",\n            "),
        indexes = indexes.join("\n        "),
    ))
}

/// Fail if the database was created for a different schema.
fn check_definition(conn: &Connection, schema: &Schema) -> Result<(), MarqueeError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT definition FROM index_definitions WHERE index_name = ?1",
            rusqlite::params![schema.index_name],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err("Failed to read index definition"))?;

    let expected = serde_json::to_string(schema)?;
    match stored {
        Some(stored) if stored != expected => Err(MarqueeError::Schema(format!(
            "Index '{}' was created with a different schema",
            schema.index_name
        ))),
        Some(_) => Ok(()),
        None => Err(MarqueeError::Schema(format!(
            "Index '{}' is not defined in this database",
            schema.index_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_migrations_create_catalog_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, &Schema::movies(384)).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "index_definitions",
            "movie_tags",
            "movies",
            "schema_migrations",
            "suggestions",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = Schema::movies(384);
        run_migrations(&conn, &schema).unwrap();
        run_migrations(&conn, &schema).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_ddl_has_one_column_per_field() {
        let schema = Schema::movies(384);
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, &schema).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(movies)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        for field in &schema.fields {
            assert!(columns.contains(&field.column.to_string()), "missing {}", field.column);
        }
    }

    #[test]
    fn test_text_fields_get_folded_columns() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, &Schema::movies(8)).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(movies)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert!(columns.contains(&"title_folded".to_string()));
        assert!(columns.contains(&"extract_folded".to_string()));
        assert!(!columns.contains(&"year_folded".to_string()));
    }
}
