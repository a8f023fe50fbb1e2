//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization, then
//! creates the catalog tables for the given schema.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use marquee_core::error::MarqueeError;
use marquee_core::schema::Schema;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations for `schema`.
    pub fn new(path: &Path, schema: &Schema) -> Result<Self, MarqueeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            MarqueeError::StoreUnavailable(format!("Failed to open database: {}", e))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -65536;",
        )
        .map_err(|e| MarqueeError::StoreUnavailable(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(|conn| migrations::run_migrations(conn, schema))?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory(schema: &Schema) -> Result<Self, MarqueeError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MarqueeError::StoreUnavailable(format!("Failed to open in-memory db: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| MarqueeError::StoreUnavailable(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(|conn| migrations::run_migrations(conn, schema))?;

        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MarqueeError>
    where
        F: FnOnce(&Connection) -> Result<T, MarqueeError>,
    {
        let conn = self.conn.lock().map_err(|e| {
            MarqueeError::StoreUnavailable(format!("Database lock poisoned: {}", e))
        })?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Map a rusqlite error into the store failure kind.
pub(crate) fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> MarqueeError + '_ {
    move |e| MarqueeError::StoreUnavailable(format!("{}: {}", context, e))
}
