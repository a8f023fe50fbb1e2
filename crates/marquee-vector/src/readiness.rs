//! Query readiness gate.
//!
//! Embeddings are generated asynchronously after documents land and nothing
//! signals completion, so readiness is approximated by the document count
//! reaching a threshold. Store failures never escape: they read as "not
//! ready" with a count of zero.

use std::sync::Arc;

use tracing::{error, info};

use marquee_storage::CatalogStore;

/// Reports whether the catalog is ready to serve queries.
pub trait ReadinessTracker: Send + Sync {
    /// Whether queries may be served.
    fn is_ready(&self) -> bool;

    /// Documents indexed so far; 0 when the store cannot be reached.
    fn total_indexed(&self) -> u64;

    /// Count at which the catalog is considered complete.
    fn expected(&self) -> u64;
}

/// Ready once the store holds at least `threshold` documents.
pub struct CountThresholdReadiness {
    store: Arc<dyn CatalogStore>,
    threshold: u64,
}

impl CountThresholdReadiness {
    pub fn new(store: Arc<dyn CatalogStore>, threshold: u64) -> Self {
        Self { store, threshold }
    }
}

impl ReadinessTracker for CountThresholdReadiness {
    fn is_ready(&self) -> bool {
        match self.store.count() {
            Ok(count) => {
                info!(count, threshold = self.threshold, "Indexed document count");
                count >= self.threshold
            }
            Err(e) => {
                error!(error = %e, "Failed to read document count");
                false
            }
        }
    }

    fn total_indexed(&self) -> u64 {
        match self.store.count() {
            Ok(count) => {
                info!(count, "Indexed document count");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to read document count");
                0
            }
        }
    }

    fn expected(&self) -> u64 {
        self.threshold
    }
}

/// Always ready. Used when queries need no embeddings.
pub struct AlwaysReady {
    store: Arc<dyn CatalogStore>,
}

impl AlwaysReady {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

impl ReadinessTracker for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }

    fn total_indexed(&self) -> u64 {
        self.store.count().unwrap_or_else(|e| {
            error!(error = %e, "Failed to read document count");
            0
        })
    }

    fn expected(&self) -> u64 {
        0
    }
}
