//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Database;
use crate::ledger::ConfigLedger;
use crate::registry::FleetRegistry;
use crate::sync::SyncOrchestrator;
use crate::transport::NodeTransport;

/// Shared application state.
///
/// Passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    ledger: ConfigLedger,
    registry: FleetRegistry,
    orchestrator: SyncOrchestrator,
}

impl AppState {
    /// Create a new application state around a database and a node
    /// transport.
    pub fn new(db: Database, transport: Arc<dyn NodeTransport>) -> Self {
        let pool = db.pool().clone();
        let ledger = ConfigLedger::new(pool.clone());
        let registry = FleetRegistry::new(pool);
        let orchestrator = SyncOrchestrator::new(ledger.clone(), registry.clone(), transport);

        Self {
            inner: Arc::new(AppStateInner {
                db,
                ledger,
                registry,
                orchestrator,
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn ledger(&self) -> &ConfigLedger {
        &self.inner.ledger
    }

    pub fn registry(&self) -> &FleetRegistry {
        &self.inner.registry
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.inner.orchestrator
    }
}
