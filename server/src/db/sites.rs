//! Database operations for the sites table.

use super::decode_enum;
use crate::sync::StoreError;
use canopy_engine::{Site, Timestamp};
use sqlx::{PgPool, Row};

/// A stored site row.
#[derive(Debug)]
pub struct StoredSite {
    pub id: String,
    pub name: String,
    pub license_number: Option<String>,
    pub last_synced_at: Option<i64>,
    pub compliance_status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredSite {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredSite {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            license_number: row.try_get("license_number")?,
            last_synced_at: row.try_get("last_synced_at")?,
            compliance_status: row.try_get("compliance_status")?,
        })
    }
}

impl StoredSite {
    pub fn to_site(&self) -> Result<Site, StoreError> {
        Ok(Site {
            id: self.id.clone(),
            name: self.name.clone(),
            license_number: self.license_number.clone(),
            last_synced_at: self.last_synced_at.map(|t| t as u64),
            compliance_status: decode_enum("compliance_status", &self.compliance_status)?,
        })
    }
}

pub async fn get_site(pool: &PgPool, site_id: &str) -> Result<Option<StoredSite>, sqlx::Error> {
    sqlx::query_as::<_, StoredSite>(
        r#"
        SELECT id, name, license_number, last_synced_at, compliance_status
        FROM sites
        WHERE id = $1
        "#,
    )
    .bind(site_id)
    .fetch_optional(pool)
    .await
}

/// Stamp the last successful sync. Returns false when the site is unknown.
pub async fn touch_site(pool: &PgPool, site_id: &str, at: Timestamp) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"UPDATE sites SET last_synced_at = $2 WHERE id = $1"#)
        .bind(site_id)
        .bind(at as i64)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}
