//! Marquee application binary - composition root.
//!
//! Ties together all Marquee crates into a single executable:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Open the SQLite catalog for the movie schema
//! 3. Load the JSON catalog unless the store already holds it
//! 4. Start the embedding backfill (vector mode)
//! 5. Start the axum REST API server

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use marquee_core::config::{MarqueeConfig, SearchMode};
use marquee_core::error::MarqueeError;
use marquee_core::schema::Schema;
use marquee_storage::{CatalogStore, Database, SqliteCatalog};
use marquee_vector::{
    AlwaysReady, CountThresholdReadiness, DynEmbeddingService, EmbeddingBackfill, HashEmbedding,
    HybridSearchEngine, MovieLoader, OnnxEmbeddingService, ReadinessTracker,
};

use marquee_api::routes;
use marquee_api::state::AppState;

use crate::cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

/// Pick the embedding backend for the catalog's vector field: the ONNX
/// model when a model directory is configured, hash vectors otherwise.
fn build_embedder(
    config: &MarqueeConfig,
    schema: &Schema,
) -> Result<Arc<dyn DynEmbeddingService>, MarqueeError> {
    let (_, field) = schema.vector_field()?;
    let Some(ref model_dir) = config.embedding.model_dir else {
        tracing::warn!(
            dimension = field.dimension,
            "No embedding.model_dir configured, using hash embeddings"
        );
        return Ok(Arc::new(HashEmbedding::new(field.dimension)));
    };

    let service = OnnxEmbeddingService::load(
        &expand_home(model_dir),
        &field,
        config.embedding.max_sequence_length,
    )?;
    Ok(Arc::new(service))
}

/// Load the JSON catalog unless the store already holds it.
///
/// Failures are logged; the server still starts over whatever is stored.
async fn load_catalog(
    config: &MarqueeConfig,
    store: Arc<dyn CatalogStore>,
    readiness: Arc<dyn ReadinessTracker>,
) {
    let mode = config.general.mode;
    let skip = match mode {
        SearchMode::Vector => readiness.is_ready(),
        SearchMode::FullText => match store.count() {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::error!(error = %e, "Failed to count stored movies, skipping load");
                true
            }
        },
    };
    if skip {
        tracing::info!(%mode, "Catalog already loaded, skipping ingestion");
        return;
    }

    let loader = match MovieLoader::from_config(store, mode, &config.ingest) {
        Ok(loader) => loader,
        Err(e) => {
            tracing::error!(error = %e, "Invalid ingest configuration");
            return;
        }
    };
    let source = expand_home(&config.ingest.source_path);
    tracing::info!(source = %source.display(), policy = ?loader.policy(), "Loading movie catalog");

    let result = tokio::task::spawn_blocking(move || loader.load(&source)).await;
    match result {
        Ok(Ok(report)) => tracing::info!(
            saved = report.saved,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Movie catalog loaded"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Movie catalog load failed"),
        Err(e) => tracing::error!(error = %e, "Movie catalog load task panicked"),
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

fn open_store(data_dir: &Path, schema: Schema) -> Result<Arc<dyn CatalogStore>, MarqueeError> {
    let db_path = data_dir.join("marquee.db");
    let db = Database::new(&db_path, &schema)?;
    tracing::info!(path = %db_path.display(), index = schema.index_name, "SQLite catalog opened");
    Ok(Arc::new(SqliteCatalog::new(Arc::new(db), schema)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let file_present = config_file.exists();
    let mut config = if file_present {
        MarqueeConfig::load(&config_file)?
    } else {
        MarqueeConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    // Tracing.
    init_tracing(&config.general.log_level);
    tracing::info!("Starting Marquee v{}", env!("CARGO_PKG_VERSION"));
    if file_present {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    let schema = Schema::movies(config.embedding.dimension);
    let store = open_store(&data_dir, schema.clone())?;

    // Embeddings.
    let embedder = build_embedder(&config, &schema)?;

    // Readiness.
    let mode = config.general.mode;
    let readiness: Arc<dyn ReadinessTracker> = match mode {
        SearchMode::Vector => Arc::new(CountThresholdReadiness::new(
            Arc::clone(&store),
            config.readiness.threshold,
        )),
        SearchMode::FullText => Arc::new(AlwaysReady::new(Arc::clone(&store))),
    };

    // === Background tasks ===

    if mode == SearchMode::Vector {
        let backfill = EmbeddingBackfill::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.embedding.backfill_batch,
            Duration::from_millis(config.embedding.backfill_interval_ms),
        );
        tokio::spawn(backfill.run());
    }

    load_catalog(&config, Arc::clone(&store), Arc::clone(&readiness)).await;

    // === API server ===

    let port = config.general.port;
    let engine = HybridSearchEngine::new(store, embedder, mode, config.search.clone());
    let state = AppState::new(config, engine, readiness);

    tracing::info!(%mode, port, "Serving movie search");
    routes::start_server(port, state).await?;

    Ok(())
}
