use super::store::StoreError;
use canopy_engine::{SiteId, SyncType};

/// Errors surfaced by sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The registry could not be reached or listed; the whole run aborted
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("a sync run for {site_id}/{sync_type} is already in progress")]
    RunInProgress { site_id: SiteId, sync_type: SyncType },

    /// The run task ended without producing a result
    #[error("sync run aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] canopy_engine::Error),
}

impl SyncError {
    /// The engine error behind this one, if any.
    pub fn engine_error(&self) -> Option<&canopy_engine::Error> {
        match self {
            SyncError::Engine(e) | SyncError::Store(StoreError::Engine(e)) => Some(e),
            _ => None,
        }
    }
}
