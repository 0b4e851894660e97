//! Database operations for the remote_observations table.
//!
//! Holds the listing seen by the latest pull of each site and sync type.
//! Linking only accepts records found here.

use super::entities::decode_fields;
use crate::sync::StoreError;
use canopy_engine::{RemoteRecord, SyncType, Timestamp};
use sqlx::{PgPool, Row};

#[derive(Debug)]
pub struct StoredObservation {
    pub remote_key: String,
    pub display_name: String,
    pub fields: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredObservation {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredObservation {
            remote_key: row.try_get("remote_key")?,
            display_name: row.try_get("display_name")?,
            fields: row.try_get("fields")?,
        })
    }
}

impl StoredObservation {
    pub fn to_remote_record(self) -> Result<RemoteRecord, StoreError> {
        Ok(RemoteRecord {
            fields: decode_fields(&self.remote_key, self.fields)?,
            remote_key: self.remote_key,
            display_name: self.display_name,
        })
    }
}

/// Replace the stored listing in one transaction.
pub async fn replace_observations(
    pool: &PgPool,
    site_id: &str,
    sync_type: SyncType,
    records: &[RemoteRecord],
    at: Timestamp,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(r#"DELETE FROM remote_observations WHERE site_id = $1 AND sync_type = $2"#)
        .bind(site_id)
        .bind(sync_type.as_str())
        .execute(&mut *tx)
        .await?;

    for record in records {
        sqlx::query(
            r#"
            INSERT INTO remote_observations (
                site_id, sync_type, remote_key, display_name, fields, observed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (site_id, sync_type, remote_key) DO NOTHING
            "#,
        )
        .bind(site_id)
        .bind(sync_type.as_str())
        .bind(&record.remote_key)
        .bind(&record.display_name)
        .bind(serde_json::Value::Object(record.fields.clone()))
        .bind(at as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn get_observation(
    pool: &PgPool,
    site_id: &str,
    sync_type: SyncType,
    remote_key: &str,
) -> Result<Option<StoredObservation>, sqlx::Error> {
    sqlx::query_as::<_, StoredObservation>(
        r#"
        SELECT remote_key, display_name, fields
        FROM remote_observations
        WHERE site_id = $1 AND sync_type = $2 AND remote_key = $3
        "#,
    )
    .bind(site_id)
    .bind(sync_type.as_str())
    .bind(remote_key)
    .fetch_optional(pool)
    .await
}
