//! Overall system status endpoint.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::ledger::ConfigVersion;
use crate::registry::{FleetNode, SyncState};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}

/// Fleet-wide convergence summary.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct StatusResponse {
    pub active_configuration: Option<ConfigVersion>,
    pub total_nodes: usize,
    pub enabled_nodes: usize,
    pub nodes_in_sync: usize,
    pub nodes_with_errors: usize,
}

fn summarize(active: Option<ConfigVersion>, nodes: &[FleetNode]) -> StatusResponse {
    let mut enabled_nodes = 0;
    let mut nodes_in_sync = 0;
    let mut nodes_with_errors = 0;

    for node in nodes {
        if !node.enabled {
            continue;
        }
        enabled_nodes += 1;
        match node.sync_state {
            SyncState::Success => nodes_in_sync += 1,
            SyncState::Error => nodes_with_errors += 1,
            SyncState::Pending | SyncState::Syncing => {}
        }
    }

    StatusResponse {
        active_configuration: active,
        total_nodes: nodes.len(),
        enabled_nodes,
        nodes_in_sync,
        nodes_with_errors,
    }
}

/// GET /v1/status
async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let nodes = state.registry().list().await?;
    let active = state.ledger().get_active().await?;

    Ok(Json(summarize(active, &nodes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_id::NodeId;

    fn node(enabled: bool, sync_state: SyncState) -> FleetNode {
        FleetNode {
            id: NodeId::new(),
            name: format!("node-{}", NodeId::new()),
            address: "10.0.0.1".to_string(),
            control_port: 2019,
            control_scheme: "http".to_string(),
            enabled,
            last_known_version_label: None,
            sync_state,
            sync_message: String::new(),
            last_sync_at: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_only_enabled_nodes() {
        let nodes = vec![
            node(true, SyncState::Success),
            node(true, SyncState::Error),
            node(true, SyncState::Pending),
            node(false, SyncState::Success),
            node(false, SyncState::Error),
        ];

        let status = summarize(None, &nodes);
        assert_eq!(status.total_nodes, 5);
        assert_eq!(status.enabled_nodes, 3);
        assert_eq!(status.nodes_in_sync, 1);
        assert_eq!(status.nodes_with_errors, 1);
    }

    #[test]
    fn summary_of_empty_fleet() {
        let status = summarize(None, &[]);
        assert_eq!(status.total_nodes, 0);
        assert_eq!(status.enabled_nodes, 0);
        assert!(status.active_configuration.is_none());
    }
}
