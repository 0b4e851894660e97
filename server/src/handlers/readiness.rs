use crate::error::Result;
use crate::sync::SyncService;
use canopy_engine::ReadinessReport;

/// Evaluate push readiness. Individual checks fail inside the report; only
/// an unknown site or a store failure is an error.
pub async fn handle_readiness(service: &SyncService, site_id: &str) -> Result<ReadinessReport> {
    Ok(service.readiness(site_id).await?)
}
