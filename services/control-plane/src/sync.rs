//! Fleet synchronization orchestrator.
//!
//! Pushes one configuration version to one or many nodes and records each
//! node's convergence state in the registry. A single unreachable node
//! never blocks or fails the others: its failure is captured in that
//! node's outcome and registry row. There is no retry and no backoff; the
//! paths back to success are a later activation fan-out or a manual
//! resync.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use convoy_id::NodeId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::ledger::{ConfigLedger, ConfigVersion};
use crate::registry::{FleetNode, FleetRegistry, SyncState};
use crate::transport::NodeTransport;

/// Result of one push to one node. Ephemeral; the durable record is the
/// node's registry row.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SyncOutcome {
    pub node_id: NodeId,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Drives configuration pushes across the fleet.
#[derive(Clone)]
pub struct SyncOrchestrator {
    ledger: ConfigLedger,
    registry: FleetRegistry,
    transport: Arc<dyn NodeTransport>,
}

impl SyncOrchestrator {
    pub fn new(
        ledger: ConfigLedger,
        registry: FleetRegistry,
        transport: Arc<dyn NodeTransport>,
    ) -> Self {
        Self {
            ledger,
            registry,
            transport,
        }
    }

    /// Pushes `version` to a single node, recording progress in the
    /// registry.
    ///
    /// Re-running with the same version is safe: the sequence re-asserts
    /// the same terminal state. On failure the node's
    /// `last_known_version_label` keeps its prior value.
    pub async fn sync_node(&self, node: &FleetNode, version: &ConfigVersion) -> SyncOutcome {
        info!(
            node_id = %node.id,
            node_name = %node.name,
            version_label = %version.version_label,
            "Starting configuration sync to node"
        );

        if let Err(e) = self
            .registry
            .update_sync_state(&node.id, SyncState::Syncing, "Synchronization in progress")
            .await
        {
            warn!(node_id = %node.id, error = %e, "Failed to record syncing state");
        }

        match self.transport.push(&node.endpoint(), &version.payload).await {
            Ok(()) => {
                let message = "Configuration synchronized successfully";

                if let Err(e) = self
                    .registry
                    .update_sync_state(&node.id, SyncState::Success, message)
                    .await
                {
                    warn!(node_id = %node.id, error = %e, "Failed to record success state");
                }
                if let Err(e) = self
                    .registry
                    .update_last_known_version(&node.id, &version.version_label)
                    .await
                {
                    warn!(node_id = %node.id, error = %e, "Failed to record last known version");
                }

                info!(
                    node_id = %node.id,
                    node_name = %node.name,
                    version_label = %version.version_label,
                    "Configuration synced to node"
                );

                SyncOutcome {
                    node_id: node.id,
                    success: true,
                    message: message.to_string(),
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                let message = format!("Failed to push configuration: {e}");

                if let Err(e) = self
                    .registry
                    .update_sync_state(&node.id, SyncState::Error, &message)
                    .await
                {
                    warn!(node_id = %node.id, error = %e, "Failed to record error state");
                }

                error!(
                    node_id = %node.id,
                    node_name = %node.name,
                    error = %message,
                    "Failed to sync configuration to node"
                );

                SyncOutcome {
                    node_id: node.id,
                    success: false,
                    message,
                    timestamp: Utc::now(),
                }
            }
        }
    }

    /// Manual resync of one node against the currently active version.
    /// Does not mutate the ledger.
    pub async fn sync_one(&self, id: &NodeId) -> Result<SyncOutcome> {
        let node = self.registry.get(id).await?;
        let version = self
            .ledger
            .get_active()
            .await?
            .ok_or_else(|| Error::NotFound("no active configuration version".to_string()))?;

        Ok(self.sync_node(&node, &version).await)
    }

    /// Fans `version` out to every enabled node concurrently.
    ///
    /// The enabled set is snapshotted once at dispatch; membership changes
    /// afterwards are not reconciled into this run. One task per node, no
    /// concurrency ceiling, each bounded only by its own transport
    /// deadline. A node failure lands in its outcome, never in this
    /// function's result; only a failing snapshot is an error. Outcome
    /// order is not significant.
    pub async fn sync_to_all(&self, version: &ConfigVersion) -> Result<Vec<SyncOutcome>> {
        let nodes = self.registry.list_enabled().await?;

        if nodes.is_empty() {
            info!("No enabled nodes to synchronize");
            return Ok(Vec::new());
        }

        info!(
            version_label = %version.version_label,
            node_count = nodes.len(),
            "Starting configuration sync to all enabled nodes"
        );

        let total = nodes.len();
        let (outcome_tx, mut outcome_rx) = mpsc::channel(total);

        for node in nodes {
            let orchestrator = self.clone();
            let version = version.clone();
            let outcome_tx = outcome_tx.clone();

            // Detached on purpose: abandoning the batch must not revoke
            // in-flight pushes.
            tokio::spawn(async move {
                let outcome = orchestrator.sync_node(&node, &version).await;
                let _ = outcome_tx.send(outcome).await;
            });
        }
        drop(outcome_tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        info!(
            version_label = %version.version_label,
            total_nodes = total,
            success_count = succeeded,
            failure_count = total - succeeded,
            "Configuration sync completed"
        );

        Ok(outcomes)
    }
}
