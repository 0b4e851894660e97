//! Manual link handler.

use crate::error::{AppError, Result};
use crate::sync::SyncService;
use canopy_engine::LinkResult;
use serde::Deserialize;

/// Request body for linking a local entity to a registry record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub remote_record_id: String,
    pub local_entity_id: String,
}

pub async fn handle_link(service: &SyncService, request: LinkRequest) -> Result<LinkResult> {
    if request.remote_record_id.is_empty() || request.local_entity_id.is_empty() {
        return Err(AppError::BadRequest(
            "remoteRecordId and localEntityId are required".into(),
        ));
    }

    Ok(service
        .link(&request.remote_record_id, &request.local_entity_id)
        .await?)
}
