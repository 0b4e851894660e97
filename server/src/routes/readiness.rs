use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::handle_readiness;
use crate::AppState;
use canopy_engine::ReadinessReport;

pub fn routes() -> Router<AppState> {
    Router::new().route("/readiness/{site_id}", get(readiness_handler))
}

/// GET /readiness/{site_id} - Push readiness report.
async fn readiness_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(site_id): Path<String>,
) -> Result<Json<ReadinessReport>> {
    Ok(Json(handle_readiness(&state.service, &site_id).await?))
}
