//! Sync run, cancellation, status and log handlers.

use crate::error::{AppError, Result};
use crate::sync::{SiteSyncStatus, SyncService};
use canopy_engine::{Direction, SyncLogEntry, SyncLogQuery, SyncResult, SyncType};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const MAX_LOG_LIMIT: usize = 500;

/// Request body for a sync run.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub site_id: String,
    pub sync_type: String,
    pub direction: Direction,
}

/// Request body for cancelling a run.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub site_id: String,
    pub sync_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// False when no run was active for the key
    pub cancelled: bool,
}

/// Query string of the log listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub site_id: String,
    pub sync_type: Option<String>,
    /// Inclusive lower bound on run start, ms since epoch
    pub from: Option<u64>,
    /// Inclusive upper bound on run start, ms since epoch
    pub to: Option<u64>,
    pub limit: Option<usize>,
}

impl LogsQuery {
    fn into_query(self) -> Result<SyncLogQuery> {
        require_site(&self.site_id)?;
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::BadRequest(format!(
                    "from ({from}) is after to ({to})"
                )));
            }
        }

        Ok(SyncLogQuery {
            site_id: self.site_id,
            sync_type: self.sync_type.as_deref().map(str::parse).transpose()?,
            from: self.from,
            to: self.to,
            limit: Some(
                self.limit
                    .unwrap_or(DEFAULT_LOG_LIMIT)
                    .clamp(1, MAX_LOG_LIMIT),
            ),
        })
    }
}

fn require_site(site_id: &str) -> Result<()> {
    if site_id.trim().is_empty() {
        return Err(AppError::BadRequest("siteId is required".into()));
    }
    Ok(())
}

/// Run one pull or push.
pub async fn handle_sync(service: &SyncService, request: SyncRequest) -> Result<SyncResult> {
    require_site(&request.site_id)?;
    let sync_type: SyncType = request.sync_type.parse()?;

    Ok(service
        .run_sync(&request.site_id, sync_type, request.direction)
        .await?)
}

pub fn handle_cancel(service: &SyncService, request: CancelRequest) -> Result<CancelResponse> {
    require_site(&request.site_id)?;
    let sync_type: SyncType = request.sync_type.parse()?;

    Ok(CancelResponse {
        cancelled: service.cancel(&request.site_id, sync_type),
    })
}

pub async fn handle_status(service: &SyncService, site_id: &str) -> Result<SiteSyncStatus> {
    Ok(service.status(site_id).await?)
}

pub async fn handle_logs(service: &SyncService, query: LogsQuery) -> Result<Vec<SyncLogEntry>> {
    let query = query.into_query()?;
    Ok(service.logs(&query).await?)
}
