//! Fleet registry: node membership and per-node convergence state.
//!
//! The registry owns `fleet_nodes` rows. The orchestrator mutates nodes
//! only through [`FleetRegistry::update_sync_state`] and
//! [`FleetRegistry::update_last_known_version`], which never touch name,
//! endpoint, or enabled.

use chrono::{DateTime, Utc};
use convoy_id::NodeId;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use tracing::info;

use crate::error::{Error, Result};
use crate::transport::NodeEndpoint;

/// Default node control API port.
pub const DEFAULT_CONTROL_PORT: i32 = 2019;
/// Default node control API scheme.
pub const DEFAULT_CONTROL_SCHEME: &str = "http";

/// Sync convergence state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Due for a sync that has not happened yet.
    Pending,
    /// A push to this node is in flight.
    Syncing,
    /// The last push succeeded.
    Success,
    /// The last push failed.
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored sync state that is none of the four known values.
#[derive(Debug, thiserror::Error)]
#[error("unknown sync state '{0}'")]
pub struct ParseSyncStateError(String);

impl std::str::FromStr for SyncState {
    type Err = ParseSyncStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "syncing" => Ok(SyncState::Syncing),
            "success" => Ok(SyncState::Success),
            "error" => Ok(SyncState::Error),
            other => Err(ParseSyncStateError(other.to_string())),
        }
    }
}

/// One managed reverse-proxy node.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct FleetNode {
    pub id: NodeId,

    /// Unique operator-chosen name.
    pub name: String,

    /// Address of the node's control API.
    pub address: String,
    pub control_port: i32,
    pub control_scheme: String,

    /// Disabled nodes are excluded from every fan-out.
    pub enabled: bool,

    /// Label of the version this node is believed to run. Reference only;
    /// moves solely on a successful push.
    pub last_known_version_label: Option<String>,

    pub sync_state: SyncState,
    pub sync_message: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

impl FleetNode {
    /// The node's control endpoint as consumed by the transport.
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            scheme: self.control_scheme.clone(),
            address: self.address.clone(),
            port: self.control_port,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for FleetNode {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let id: String = row.try_get("id")?;
        let id = NodeId::parse(&id).map_err(|e| sqlx::Error::ColumnDecode {
            index: "id".to_string(),
            source: Box::new(e),
        })?;

        let sync_state: String = row.try_get("sync_state")?;
        let sync_state = sync_state
            .parse::<SyncState>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "sync_state".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            control_port: row.try_get("control_port")?,
            control_scheme: row.try_get("control_scheme")?,
            enabled: row.try_get("enabled")?,
            last_known_version_label: row.try_get("last_known_version_label")?,
            sync_state,
            sync_message: row.try_get("sync_message")?,
            last_sync_at: row.try_get("last_sync_at")?,
            added_at: row.try_get("added_at")?,
        })
    }
}

/// Creation/update request for a fleet node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub control_port: Option<i32>,
    #[serde(default)]
    pub control_scheme: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A node spec with defaults applied and required fields checked.
#[derive(Debug)]
struct NodeSettings {
    name: String,
    address: String,
    control_port: i32,
    control_scheme: String,
    enabled: bool,
}

impl NodeSpec {
    fn into_settings(self) -> Result<NodeSettings> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("node name cannot be empty".to_string()));
        }

        let address = self.address.trim().to_string();
        if address.is_empty() {
            return Err(Error::Validation(
                "node address cannot be empty".to_string(),
            ));
        }

        let control_port = self.control_port.unwrap_or(DEFAULT_CONTROL_PORT);
        if !(1..=65535).contains(&control_port) {
            return Err(Error::Validation(format!(
                "control port {control_port} is out of range"
            )));
        }

        let control_scheme = self
            .control_scheme
            .unwrap_or_else(|| DEFAULT_CONTROL_SCHEME.to_string());
        if control_scheme != "http" && control_scheme != "https" {
            return Err(Error::Validation(format!(
                "control scheme must be http or https, got '{control_scheme}'"
            )));
        }

        Ok(NodeSettings {
            name,
            address,
            control_port,
            control_scheme,
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

const NODE_COLUMNS: &str = r#"
    id, name, address, control_port, control_scheme, enabled,
    last_known_version_label, sync_state, sync_message, last_sync_at, added_at
"#;

fn map_unique_violation(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let detail = match db_err.constraint() {
                Some("fleet_nodes_name_key") => "a node with this name already exists",
                Some("fleet_nodes_address_control_port_key") => {
                    "a node with this control endpoint already exists"
                }
                _ => "duplicate value for a unique node field",
            };
            return Error::Validation(detail.to_string());
        }
    }
    Error::Persistence(err)
}

/// Store of fleet member records.
#[derive(Clone)]
pub struct FleetRegistry {
    pool: PgPool,
}

impl FleetRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns all nodes, ordered by name.
    pub async fn list(&self) -> Result<Vec<FleetNode>> {
        let nodes = sqlx::query_as::<_, FleetNode>(&format!(
            "SELECT {NODE_COLUMNS} FROM fleet_nodes ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    /// Returns the nodes that take part in fan-outs, ordered by name.
    pub async fn list_enabled(&self) -> Result<Vec<FleetNode>> {
        let nodes = sqlx::query_as::<_, FleetNode>(&format!(
            "SELECT {NODE_COLUMNS} FROM fleet_nodes WHERE enabled = TRUE ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    pub async fn get(&self, id: &NodeId) -> Result<FleetNode> {
        let node = sqlx::query_as::<_, FleetNode>(&format!(
            "SELECT {NODE_COLUMNS} FROM fleet_nodes WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        node.ok_or_else(|| Error::NotFound(format!("node {id} not found")))
    }

    /// Registers a new node. Missing fields default to port 2019, scheme
    /// http, enabled; the node starts out pending.
    pub async fn create(&self, spec: NodeSpec) -> Result<FleetNode> {
        let settings = spec.into_settings()?;

        let node = FleetNode {
            id: NodeId::new(),
            name: settings.name,
            address: settings.address,
            control_port: settings.control_port,
            control_scheme: settings.control_scheme,
            enabled: settings.enabled,
            last_known_version_label: None,
            sync_state: SyncState::Pending,
            sync_message: String::new(),
            last_sync_at: None,
            added_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO fleet_nodes (id, name, address, control_port, control_scheme,
                                     enabled, sync_state, sync_message, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(node.id.to_string())
        .bind(&node.name)
        .bind(&node.address)
        .bind(node.control_port)
        .bind(&node.control_scheme)
        .bind(node.enabled)
        .bind(node.sync_state.as_str())
        .bind(&node.sync_message)
        .bind(node.added_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        info!(node_id = %node.id, node_name = %node.name, address = %node.address, "Fleet node registered");

        Ok(node)
    }

    /// Updates a node's membership fields.
    ///
    /// A disabled node that becomes enabled is additionally marked pending,
    /// so the next sync picks it up; the registry itself performs no I/O
    /// toward the node.
    pub async fn update(&self, id: &NodeId, spec: NodeSpec) -> Result<FleetNode> {
        let settings = spec.into_settings()?;
        let existing = self.get(id).await?;

        sqlx::query(
            r#"
            UPDATE fleet_nodes
            SET name = $2, address = $3, control_port = $4, control_scheme = $5, enabled = $6
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(&settings.name)
        .bind(&settings.address)
        .bind(settings.control_port)
        .bind(&settings.control_scheme)
        .bind(settings.enabled)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        if !existing.enabled && settings.enabled {
            self.update_sync_state(id, SyncState::Pending, "Enabled - pending sync")
                .await?;
        }

        info!(node_id = %id, node_name = %settings.name, enabled = settings.enabled, "Fleet node updated");

        self.get(id).await
    }

    pub async fn delete(&self, id: &NodeId) -> Result<()> {
        self.get(id).await?;

        sqlx::query("DELETE FROM fleet_nodes WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        info!(node_id = %id, "Fleet node deleted");
        Ok(())
    }

    /// Records sync progress for a node. Used by the orchestrator; never
    /// touches name, endpoint, or enabled.
    pub async fn update_sync_state(
        &self,
        id: &NodeId,
        state: SyncState,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fleet_nodes
            SET sync_state = $2, sync_message = $3, last_sync_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(state.as_str())
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records the version a node is believed to run after a successful push.
    pub async fn update_last_known_version(&self, id: &NodeId, label: &str) -> Result<()> {
        sqlx::query("UPDATE fleet_nodes SET last_known_version_label = $2 WHERE id = $1")
            .bind(id.to_string())
            .bind(label)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(name: &str, address: &str) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            address: address.to_string(),
            control_port: None,
            control_scheme: None,
            enabled: None,
        }
    }

    #[test]
    fn spec_defaults_apply() {
        let settings = spec("edge1", "10.0.0.1").into_settings().unwrap();
        assert_eq!(settings.control_port, 2019);
        assert_eq!(settings.control_scheme, "http");
        assert!(settings.enabled);
    }

    #[rstest]
    #[case("", "10.0.0.1")]
    #[case("   ", "10.0.0.1")]
    #[case("edge1", "")]
    #[case("edge1", "  ")]
    fn spec_rejects_empty_required_fields(#[case] name: &str, #[case] address: &str) {
        let err = spec(name, address).into_settings().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(70_000)]
    fn spec_rejects_out_of_range_ports(#[case] port: i32) {
        let mut s = spec("edge1", "10.0.0.1");
        s.control_port = Some(port);
        assert!(matches!(s.into_settings(), Err(Error::Validation(_))));
    }

    #[test]
    fn spec_rejects_unknown_scheme() {
        let mut s = spec("edge1", "10.0.0.1");
        s.control_scheme = Some("ftp".to_string());
        assert!(matches!(s.into_settings(), Err(Error::Validation(_))));
    }

    #[test]
    fn sync_state_round_trips_through_strings() {
        for state in [
            SyncState::Pending,
            SyncState::Syncing,
            SyncState::Success,
            SyncState::Error,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("stuck".parse::<SyncState>().is_err());
    }

    #[test]
    fn sync_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SyncState::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn node_endpoint_uses_control_fields() {
        let node = FleetNode {
            id: NodeId::new(),
            name: "edge1".to_string(),
            address: "10.0.1.10".to_string(),
            control_port: 2019,
            control_scheme: "https".to_string(),
            enabled: true,
            last_known_version_label: None,
            sync_state: SyncState::Pending,
            sync_message: String::new(),
            last_sync_at: None,
            added_at: Utc::now(),
        };
        assert_eq!(node.endpoint().base_url(), "https://10.0.1.10:2019");
    }

    #[test]
    fn spec_deserializes_with_optional_fields_absent() {
        let json = r#"{"name": "edge1", "address": "10.0.0.1"}"#;
        let spec: NodeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "edge1");
        assert!(spec.control_port.is_none());
        assert!(spec.enabled.is_none());
    }
}
