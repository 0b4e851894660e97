//! Database operations for the sync_logs table.

use super::{decode_enum, encode_enum};
use crate::sync::StoreError;
use canopy_engine::{SyncLogEntry, SyncLogQuery};
use sqlx::{PgPool, Row};

/// A stored sync log row.
#[derive(Debug)]
pub struct StoredSyncLog {
    pub id: String,
    pub site_id: String,
    pub sync_type: String,
    pub direction: String,
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub error_message: Option<String>,
    pub counts: serde_json::Value,
    #[allow(dead_code)]
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredSyncLog {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredSyncLog {
            id: row.try_get("id")?,
            site_id: row.try_get("site_id")?,
            sync_type: row.try_get("sync_type")?,
            direction: row.try_get("direction")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error_message: row.try_get("error_message")?,
            counts: row.try_get("counts")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl StoredSyncLog {
    pub fn to_entry(self) -> Result<SyncLogEntry, StoreError> {
        let counts = serde_json::from_value(self.counts)
            .map_err(|e| StoreError::Corrupt(format!("counts of log {}: {e}", self.id)))?;

        Ok(SyncLogEntry {
            sync_type: self
                .sync_type
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("sync_type: unknown value {:?}", self.sync_type)))?,
            direction: decode_enum("direction", &self.direction)?,
            status: decode_enum("status", &self.status)?,
            id: self.id,
            site_id: self.site_id,
            started_at: self.started_at as u64,
            finished_at: self.finished_at.map(|t| t as u64),
            error_message: self.error_message,
            counts,
        })
    }
}

pub async fn insert_sync_log(pool: &PgPool, entry: &SyncLogEntry) -> Result<(), StoreError> {
    let counts = serde_json::to_value(entry.counts)
        .map_err(|e| StoreError::Corrupt(format!("counts of log {}: {e}", entry.id)))?;

    sqlx::query(
        r#"
        INSERT INTO sync_logs (
            id, site_id, sync_type, direction, status, started_at,
            finished_at, error_message, counts
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.site_id)
    .bind(entry.sync_type.as_str())
    .bind(encode_enum(&entry.direction)?)
    .bind(encode_enum(&entry.status)?)
    .bind(entry.started_at as i64)
    .bind(entry.finished_at.map(|t| t as i64))
    .bind(&entry.error_message)
    .bind(counts)
    .execute(pool)
    .await?;

    Ok(())
}

/// Entries matching a query, newest first. Time bounds are inclusive.
pub async fn query_sync_logs(
    pool: &PgPool,
    query: &SyncLogQuery,
) -> Result<Vec<StoredSyncLog>, sqlx::Error> {
    sqlx::query_as::<_, StoredSyncLog>(
        r#"
        SELECT id, site_id, sync_type, direction, status, started_at,
               finished_at, error_message, counts, recorded_at
        FROM sync_logs
        WHERE site_id = $1
          AND ($2::text IS NULL OR sync_type = $2)
          AND ($3::bigint IS NULL OR started_at >= $3)
          AND ($4::bigint IS NULL OR started_at <= $4)
        ORDER BY started_at DESC, recorded_at DESC
        LIMIT $5
        "#,
    )
    .bind(&query.site_id)
    .bind(query.sync_type.map(|t| t.as_str()))
    .bind(query.from.map(|t| t as i64))
    .bind(query.to.map(|t| t as i64))
    .bind(query.limit.map(|l| l as i64))
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_engine::{Direction, RunStatus, SyncType};
    use serde_json::json;

    #[test]
    fn row_to_entry() {
        let row = StoredSyncLog {
            id: "log-1".into(),
            site_id: "site-1".into(),
            sync_type: "plant_batches".into(),
            direction: "push".into(),
            status: "partial".into(),
            started_at: 1000,
            finished_at: Some(1500),
            error_message: Some("Batch 3: registry rejected request".into()),
            counts: json!({"found": 3, "pushed": 2, "failed": 1}),
            recorded_at: chrono::Utc::now(),
        };

        let entry = row.to_entry().unwrap();
        assert_eq!(entry.sync_type, SyncType::PlantBatches);
        assert_eq!(entry.direction, Direction::Push);
        assert_eq!(entry.status, RunStatus::Partial);
        assert_eq!(entry.counts.pushed, 2);
        assert_eq!(entry.counts.created, 0);
        assert_eq!(entry.finished_at, Some(1500));
    }
}
