//! Configuration version ledger.
//!
//! Append-only store of configuration versions with a single-active
//! invariant: at most one record carries `active = true` at any time,
//! across the entire history. Records never change after insert except the
//! active flag flip performed inside the activation transaction.

use chrono::{DateTime, Utc};
use convoy_id::VersionId;
use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::error::{Error, Result};

/// Activations from concurrent callers serialize on this advisory lock so
/// the clear-then-insert step stays last-committed-wins.
const ACTIVATION_LOCK_KEY: i64 = 0x434F_4E56_4F59;

/// One immutable configuration version record.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ConfigVersion {
    /// Record id, assigned at creation.
    pub id: VersionId,

    /// Human-legible label, unique and increasing with creation order.
    pub version_label: String,

    /// The configuration body as text. Validated for JSON well-formedness
    /// only; the ledger knows nothing about its meaning.
    pub payload: String,

    /// Free-text provenance note.
    pub description: String,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Whether this is the currently active version.
    pub active: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ConfigVersion {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let id: String = row.try_get("id")?;
        let id = VersionId::parse(&id).map_err(|e| sqlx::Error::ColumnDecode {
            index: "id".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id,
            version_label: row.try_get("version_label")?,
            payload: row.try_get("payload")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            active: row.try_get("active")?,
        })
    }
}

/// Derives the version label for a record created at `at`.
///
/// Millisecond precision keeps labels unique across back-to-back
/// activations; the unique constraint on the column is the backstop.
fn version_label_at(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S%.3f").to_string()
}

/// Checks that a payload is syntactically well-formed JSON.
fn validate_payload(payload: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(payload)
        .map_err(|e| Error::Validation(format!("configuration payload is not valid JSON: {e}")))?;
    Ok(())
}

/// Versioned configuration store.
#[derive(Clone)]
pub struct ConfigLedger {
    pool: PgPool,
}

impl ConfigLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the currently active version, if any. No active record is a
    /// valid state, not an error.
    pub async fn get_active(&self) -> Result<Option<ConfigVersion>> {
        let version = sqlx::query_as::<_, ConfigVersion>(
            r#"
            SELECT id, version_label, payload, description, created_at, active
            FROM config_versions
            WHERE active = TRUE
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }

    /// Inserts a new record and makes it the single active version.
    ///
    /// Clearing the previous active flag and inserting the new record happen
    /// in one transaction; a storage failure leaves no partial effect.
    pub async fn activate(&self, payload: &str, description: &str) -> Result<ConfigVersion> {
        validate_payload(payload)?;

        let now = Utc::now();
        let version = ConfigVersion {
            id: VersionId::new(),
            version_label: version_label_at(now),
            payload: payload.to_owned(),
            description: description.to_owned(),
            created_at: now,
            active: true,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ACTIVATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE config_versions SET active = FALSE WHERE active = TRUE")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO config_versions (id, version_label, payload, description, created_at, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(version.id.to_string())
        .bind(&version.version_label)
        .bind(&version.payload)
        .bind(&version.description)
        .bind(version.created_at)
        .bind(version.active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            version_id = %version.id,
            version_label = %version.version_label,
            description = %version.description,
            "New active configuration version"
        );

        Ok(version)
    }

    /// Returns all versions, newest first.
    pub async fn history(&self) -> Result<Vec<ConfigVersion>> {
        let versions = sqlx::query_as::<_, ConfigVersion>(
            r#"
            SELECT id, version_label, payload, description, created_at, active
            FROM config_versions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    /// Looks up one version by its label.
    pub async fn get_by_version(&self, label: &str) -> Result<ConfigVersion> {
        let version = sqlx::query_as::<_, ConfigVersion>(
            r#"
            SELECT id, version_label, payload, description, created_at, active
            FROM config_versions
            WHERE version_label = $1
            "#,
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;

        version.ok_or_else(|| Error::NotFound(format!("configuration version '{label}' not found")))
    }

    /// Re-activates the payload of a historical version as a new record.
    ///
    /// The historical record is untouched apart from losing the active flag;
    /// the returned record has a fresh id and label.
    pub async fn rollback_to(&self, label: &str) -> Result<ConfigVersion> {
        let historical = self.get_by_version(label).await?;

        let version = self
            .activate(
                &historical.payload,
                &format!("Rollback to version {label}"),
            )
            .await?;

        info!(
            rolled_back_to = %label,
            new_version_label = %version.version_label,
            "Configuration rolled back"
        );

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_label_is_time_derived() {
        let at = Utc.with_ymd_and_hms(2025, 8, 4, 9, 30, 17).unwrap();
        assert_eq!(version_label_at(at), "20250804-093017.000");
    }

    #[test]
    fn version_labels_order_with_time() {
        let earlier = Utc.with_ymd_and_hms(2025, 8, 4, 9, 30, 17).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(version_label_at(earlier) < version_label_at(later));
    }

    #[test]
    fn payload_must_be_well_formed_json() {
        assert!(validate_payload(r#"{"apps":{"http":{}}}"#).is_ok());
        assert!(validate_payload("[1, 2, 3]").is_ok());
        assert!(validate_payload("").is_err());
        assert!(validate_payload("{not json").is_err());

        let err = validate_payload("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn config_version_serializes_with_flat_field_names() {
        let version = ConfigVersion {
            id: VersionId::new(),
            version_label: "20250804-093017.000".to_string(),
            payload: r#"{"a":1}"#.to_string(),
            description: "initial".to_string(),
            created_at: Utc::now(),
            active: true,
        };

        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json["version_label"], "20250804-093017.000");
        assert_eq!(json["active"], true);
        assert!(json["id"].as_str().unwrap().starts_with("cfg_"));
    }
}
