use axum::{extract::State, routing::post, Json, Router};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_link, LinkRequest};
use crate::AppState;
use canopy_engine::LinkResult;

pub fn routes() -> Router<AppState> {
    Router::new().route("/link", post(link_handler))
}

/// POST /link - Bind a local entity to a record from the latest pull.
async fn link_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<LinkRequest>,
) -> Result<Json<LinkResult>> {
    Ok(Json(handle_link(&state.service, request).await?))
}
