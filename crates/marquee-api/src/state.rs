//! Application state shared across all route handlers.
//!
//! AppState holds references to the search engine, the readiness tracker,
//! and the configuration. It is passed to handlers via axum's State
//! extractor.

use std::sync::Arc;
use std::time::Instant;

use marquee_core::config::MarqueeConfig;
use marquee_vector::{HybridSearchEngine, ReadinessTracker};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<MarqueeConfig>,
    /// Query engine over the catalog.
    pub engine: Arc<HybridSearchEngine>,
    /// Gate for the query endpoints.
    pub readiness: Arc<dyn ReadinessTracker>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: MarqueeConfig,
        engine: HybridSearchEngine,
        readiness: Arc<dyn ReadinessTracker>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            readiness,
            start_time: Instant::now(),
        }
    }
}
