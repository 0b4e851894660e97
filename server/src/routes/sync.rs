//! Sync endpoint routes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_cancel, handle_logs, handle_status, handle_sync, CancelRequest, CancelResponse,
    LogsQuery, SyncRequest,
};
use crate::sync::SiteSyncStatus;
use crate::AppState;
use canopy_engine::{SyncLogEntry, SyncResult};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/sync/cancel", post(cancel_handler))
        .route("/sync/status/{site_id}", get(status_handler))
        .route("/sync/logs", get(logs_handler))
}

/// POST /sync - Run a pull or push for one site and sync type.
async fn sync_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResult>> {
    let result = handle_sync(&state.service, request).await?;
    Ok(Json(result))
}

/// POST /sync/cancel - Ask an in-flight run to stop after its current item.
async fn cancel_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>> {
    Ok(Json(handle_cancel(&state.service, request)?))
}

/// GET /sync/status/{site_id}
async fn status_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(site_id): Path<String>,
) -> Result<Json<SiteSyncStatus>> {
    Ok(Json(handle_status(&state.service, &site_id).await?))
}

/// GET /sync/logs - Run history, newest first.
async fn logs_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<SyncLogEntry>>> {
    Ok(Json(handle_logs(&state.service, query).await?))
}
