//! Fleet node endpoints.
//!
//! Membership CRUD plus the manual single-node resync. Creating an enabled
//! node, or re-enabling a disabled one, triggers an initial sync in a
//! detached task when an active configuration already exists; the registry
//! itself only marks the node pending.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use convoy_id::NodeId;
use serde::Serialize;
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::registry::NodeSpec;
use crate::state::AppState;
use crate::sync::SyncOutcome;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_nodes).post(create_node))
        .route(
            "/{node_id}",
            get(get_node).put(update_node).delete(delete_node),
        )
        .route("/{node_id}/sync", post(sync_node))
}

/// Response for a manual single-node resync.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SyncNodeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: SyncOutcome,
}

/// Response for a node deletion.
#[derive(Debug, Serialize)]
pub struct DeleteNodeResponse {
    pub message: String,
}

fn parse_node_id(raw: &str) -> Result<NodeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid_node_id", "Invalid node ID format"))
}

/// Push the active version to a freshly enabled node, off the request path.
fn spawn_initial_sync(state: &AppState, node_id: NodeId) {
    let ledger = state.ledger().clone();
    let orchestrator = state.orchestrator().clone();
    tokio::spawn(async move {
        match ledger.get_active().await {
            Ok(Some(_)) => match orchestrator.sync_one(&node_id).await {
                Ok(outcome) if outcome.success => {
                    info!(node_id = %node_id, "Initial configuration sync complete");
                }
                Ok(outcome) => {
                    error!(
                        node_id = %node_id,
                        message = %outcome.message,
                        "Initial configuration sync failed"
                    );
                }
                Err(e) => {
                    error!(node_id = %node_id, error = %e, "Initial configuration sync failed");
                }
            },
            // Nothing to push yet; the node stays pending.
            Ok(None) => {}
            Err(e) => {
                error!(
                    node_id = %node_id,
                    error = %e,
                    "Failed to look up active configuration for initial sync"
                );
            }
        }
    });
}

/// GET /v1/nodes
async fn list_nodes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let nodes = state.registry().list().await?;
    Ok(Json(nodes))
}

/// POST /v1/nodes
async fn create_node(
    State(state): State<AppState>,
    Json(spec): Json<NodeSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state.registry().create(spec).await?;

    if node.enabled {
        spawn_initial_sync(&state, node.id);
    }

    Ok((StatusCode::CREATED, Json(node)))
}

/// GET /v1/nodes/{node_id}
async fn get_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node_id = parse_node_id(&node_id)?;
    let node = state.registry().get(&node_id).await?;
    Ok(Json(node))
}

/// PUT /v1/nodes/{node_id}
async fn update_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(spec): Json<NodeSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let node_id = parse_node_id(&node_id)?;

    let existing = state.registry().get(&node_id).await?;
    let node = state.registry().update(&node_id, spec).await?;

    if !existing.enabled && node.enabled {
        spawn_initial_sync(&state, node.id);
    }

    Ok(Json(node))
}

/// DELETE /v1/nodes/{node_id}
async fn delete_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node_id = parse_node_id(&node_id)?;
    state.registry().delete(&node_id).await?;

    Ok(Json(DeleteNodeResponse {
        message: "Node deleted successfully".to_string(),
    }))
}

/// POST /v1/nodes/{node_id}/sync
///
/// Manual resync of one node against the active version. A failed push is
/// reported as an error response with the outcome attached.
async fn sync_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node_id = parse_node_id(&node_id)?;

    let outcome = state.orchestrator().sync_one(&node_id).await?;

    let response = if outcome.success {
        (
            StatusCode::OK,
            Json(SyncNodeResponse {
                message: Some("Configuration sync successful".to_string()),
                error: None,
                result: outcome,
            }),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SyncNodeResponse {
                message: None,
                error: Some("Configuration sync failed".to_string()),
                result: outcome,
            }),
        )
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn node_id_parsing_rejects_garbage() {
        assert!(parse_node_id("not-an-id").is_err());
        assert!(parse_node_id("cfg_01HV4Z2WQXKJNM8GPQY6VBKC3D").is_err());

        let id = NodeId::new();
        assert_eq!(parse_node_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn sync_node_response_omits_absent_fields() {
        let response = SyncNodeResponse {
            message: Some("Configuration sync successful".to_string()),
            error: None,
            result: SyncOutcome {
                node_id: NodeId::new(),
                success: true,
                message: "Configuration synchronized successfully".to_string(),
                timestamp: Utc::now(),
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"message\""));
        assert!(!json.contains("\"error\""));
    }
}
