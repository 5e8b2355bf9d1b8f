//! Configuration ledger endpoints.
//!
//! Activation and rollback respond as soon as the ledger transaction
//! commits; the fleet fan-out runs in a detached task and lands in the
//! registry asynchronously. The manual sync endpoint waits for the whole
//! batch and reports per-node outcomes.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::error::ApiError;
use crate::ledger::ConfigVersion;
use crate::state::AppState;
use crate::sync::SyncOutcome;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/active", get(get_active).post(activate))
        .route("/sync", post(sync_all))
        .route("/history", get(history))
        .route("/history/{version_label}", get(get_by_version))
        .route("/rollback/{version_label}", post(rollback))
}

/// Request to activate a new configuration version.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    /// Configuration body as a JSON document.
    pub payload: String,

    /// Free-text provenance note.
    #[serde(default)]
    pub description: String,
}

/// Aggregate result of a fleet-wide synchronization.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SyncReport {
    pub message: String,
    pub results: Vec<SyncOutcome>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl SyncReport {
    pub fn new(results: Vec<SyncOutcome>) -> Self {
        let success_count = results.iter().filter(|o| o.success).count();
        let failure_count = results.len() - success_count;
        Self {
            message: format!("Sync completed: {success_count} successful, {failure_count} failed"),
            results,
            success_count,
            failure_count,
        }
    }
}

/// Fan the version out to the fleet without holding up the response.
fn spawn_fleet_sync(state: &AppState, version: &ConfigVersion) {
    let orchestrator = state.orchestrator().clone();
    let version = version.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.sync_to_all(&version).await {
            error!(
                error = %e,
                version_label = %version.version_label,
                "Fleet synchronization failed"
            );
        }
    });
}

/// GET /v1/configurations/active
async fn get_active(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.ledger().get_active().await? {
        Some(version) => Ok(Json(version)),
        None => Err(ApiError::not_found(
            "no_active_configuration",
            "No active configuration version",
        )),
    }
}

/// POST /v1/configurations/active
async fn activate(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .ledger()
        .activate(&req.payload, &req.description)
        .await?;

    spawn_fleet_sync(&state, &version);

    Ok(Json(version))
}

/// GET /v1/configurations/history
async fn history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let versions = state.ledger().history().await?;
    Ok(Json(versions))
}

/// GET /v1/configurations/history/{version_label}
async fn get_by_version(
    State(state): State<AppState>,
    Path(version_label): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state.ledger().get_by_version(&version_label).await?;
    Ok(Json(version))
}

/// POST /v1/configurations/rollback/{version_label}
async fn rollback(
    State(state): State<AppState>,
    Path(version_label): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state.ledger().rollback_to(&version_label).await?;

    spawn_fleet_sync(&state, &version);

    Ok(Json(version))
}

/// POST /v1/configurations/sync
///
/// Manual resync of every enabled node against the active version. A batch
/// with failing nodes is still a 200; the failures are in the per-node
/// results.
async fn sync_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let version = state.ledger().get_active().await?.ok_or_else(|| {
        ApiError::not_found("no_active_configuration", "No active configuration version")
    })?;

    let results = state.orchestrator().sync_to_all(&version).await?;

    Ok(Json(SyncReport::new(results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_id::NodeId;

    fn outcome(success: bool) -> SyncOutcome {
        SyncOutcome {
            node_id: NodeId::new(),
            success,
            message: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn sync_report_counts_outcomes() {
        let report = SyncReport::new(vec![outcome(true), outcome(false), outcome(true)]);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.message, "Sync completed: 2 successful, 1 failed");
    }

    #[test]
    fn sync_report_for_empty_fleet() {
        let report = SyncReport::new(Vec::new());
        assert_eq!(report.success_count, 0);
        assert_eq!(report.failure_count, 0);
        assert!(report.results.is_empty());
    }

    #[test]
    fn activate_request_defaults_description() {
        let req: ActivateRequest =
            serde_json::from_str(r#"{"payload": "{\"a\":1}"}"#).unwrap();
        assert_eq!(req.payload, r#"{"a":1}"#);
        assert_eq!(req.description, "");
    }
}
