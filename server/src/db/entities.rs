//! Database operations for the local_entities table.

use super::decode_enum;
use crate::sync::StoreError;
use canopy_engine::{Fields, LocalEntity, RemoteMapping, SyncType};
use sqlx::{PgPool, Row};

/// A stored local entity row.
#[derive(Debug)]
pub struct StoredEntity {
    pub id: String,
    pub site_id: String,
    pub sync_type: String,
    pub name: String,
    pub remote_key: Option<String>,
    pub remote_name: Option<String>,
    pub fields: serde_json::Value,
    pub active: bool,
    pub orphaned: bool,
    pub confirmed: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<i64>,
    pub sync_status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEntity {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEntity {
            id: row.try_get("id")?,
            site_id: row.try_get("site_id")?,
            sync_type: row.try_get("sync_type")?,
            name: row.try_get("name")?,
            remote_key: row.try_get("remote_key")?,
            remote_name: row.try_get("remote_name")?,
            fields: row.try_get("fields")?,
            active: row.try_get("active")?,
            orphaned: row.try_get("orphaned")?,
            confirmed: row.try_get("confirmed")?,
            last_error: row.try_get("last_error")?,
            last_synced_at: row.try_get("last_synced_at")?,
            sync_status: row.try_get("sync_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredEntity {
    /// Convert a database row to an engine entity.
    pub fn to_entity(self) -> Result<LocalEntity, StoreError> {
        let sync_type: SyncType = self
            .sync_type
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("sync_type: unknown value {:?}", self.sync_type)))?;

        Ok(LocalEntity {
            sync_type,
            sync_status: decode_enum("sync_status", &self.sync_status)?,
            fields: decode_fields(&self.id, self.fields)?,
            mapping: self.remote_key.map(|remote_key| RemoteMapping {
                remote_key,
                remote_name: self.remote_name,
            }),
            id: self.id,
            site_id: self.site_id,
            name: self.name,
            active: self.active,
            orphaned: self.orphaned,
            confirmed: self.confirmed,
            last_error: self.last_error,
            last_synced_at: self.last_synced_at.map(|t| t as u64),
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
        })
    }
}

/// A JSONB column that must hold an object.
pub(super) fn decode_fields(owner: &str, value: serde_json::Value) -> Result<Fields, StoreError> {
    match value {
        serde_json::Value::Object(fields) => Ok(fields),
        serde_json::Value::Null => Ok(Fields::new()),
        other => Err(StoreError::Corrupt(format!(
            "fields of {owner}: expected an object, got {other}"
        ))),
    }
}

const COLUMNS: &str = r#"
    id, site_id, sync_type, name, remote_key, remote_name, fields, active,
    orphaned, confirmed, last_error, last_synced_at, sync_status, created_at,
    updated_at
"#;

/// All entities of one site and sync type, oldest first.
pub async fn list_entities(
    pool: &PgPool,
    site_id: &str,
    sync_type: SyncType,
) -> Result<Vec<StoredEntity>, sqlx::Error> {
    sqlx::query_as::<_, StoredEntity>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM local_entities
        WHERE site_id = $1 AND sync_type = $2
        ORDER BY created_at ASC, id ASC
        "#
    ))
    .bind(site_id)
    .bind(sync_type.as_str())
    .fetch_all(pool)
    .await
}

pub async fn get_entity(pool: &PgPool, id: &str) -> Result<Option<StoredEntity>, sqlx::Error> {
    sqlx::query_as::<_, StoredEntity>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM local_entities
        WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// The entity holding a remote key.
pub async fn get_entity_by_remote_key(
    pool: &PgPool,
    site_id: &str,
    sync_type: SyncType,
    remote_key: &str,
) -> Result<Option<StoredEntity>, sqlx::Error> {
    sqlx::query_as::<_, StoredEntity>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM local_entities
        WHERE site_id = $1 AND sync_type = $2 AND remote_key = $3
        "#
    ))
    .bind(site_id)
    .bind(sync_type.as_str())
    .bind(remote_key)
    .fetch_optional(pool)
    .await
}

pub async fn insert_entity(pool: &PgPool, entity: &LocalEntity) -> Result<(), sqlx::Error> {
    let mapping = entity.mapping.as_ref();

    sqlx::query(
        r#"
        INSERT INTO local_entities (
            id, site_id, sync_type, name, remote_key, remote_name, fields, active,
            orphaned, confirmed, last_error, last_synced_at, sync_status,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(&entity.id)
    .bind(&entity.site_id)
    .bind(entity.sync_type.as_str())
    .bind(&entity.name)
    .bind(mapping.map(|m| &m.remote_key))
    .bind(mapping.and_then(|m| m.remote_name.as_ref()))
    .bind(serde_json::Value::Object(entity.fields.clone()))
    .bind(entity.active)
    .bind(entity.orphaned)
    .bind(entity.confirmed)
    .bind(&entity.last_error)
    .bind(entity.last_synced_at.map(|t| t as i64))
    .bind(entity.sync_status.as_str())
    .bind(entity.created_at as i64)
    .bind(entity.updated_at as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite an entity. Returns false when no row has its ID.
pub async fn update_entity(pool: &PgPool, entity: &LocalEntity) -> Result<bool, sqlx::Error> {
    let mapping = entity.mapping.as_ref();

    let result = sqlx::query(
        r#"
        UPDATE local_entities SET
            name = $2,
            remote_key = $3,
            remote_name = $4,
            fields = $5,
            active = $6,
            orphaned = $7,
            confirmed = $8,
            last_error = $9,
            last_synced_at = $10,
            sync_status = $11,
            updated_at = $12
        WHERE id = $1
        "#,
    )
    .bind(&entity.id)
    .bind(&entity.name)
    .bind(mapping.map(|m| &m.remote_key))
    .bind(mapping.and_then(|m| m.remote_name.as_ref()))
    .bind(serde_json::Value::Object(entity.fields.clone()))
    .bind(entity.active)
    .bind(entity.orphaned)
    .bind(entity.confirmed)
    .bind(&entity.last_error)
    .bind(entity.last_synced_at.map(|t| t as i64))
    .bind(entity.sync_status.as_str())
    .bind(entity.updated_at as i64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
