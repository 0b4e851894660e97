//! Persistence seam for reconciliation state.

use async_trait::async_trait;
use canopy_engine::{
    LocalEntity, RemoteRecord, Site, SyncLogEntry, SyncLogQuery, SyncType, Timestamp,
};

/// Local record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Engine(#[from] canopy_engine::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// The shared local record store.
///
/// Writes must reject a remote key already held by another entity of the
/// same site and sync type with [`canopy_engine::Error::InvariantViolation`].
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn site(&self, site_id: &str) -> Result<Option<Site>, StoreError>;

    /// Stamp a site's last successful sync.
    async fn touch_site(&self, site_id: &str, at: Timestamp) -> Result<(), StoreError>;

    /// All entities of one site and sync type, oldest first.
    async fn entities(
        &self,
        site_id: &str,
        sync_type: SyncType,
    ) -> Result<Vec<LocalEntity>, StoreError>;

    async fn entity(&self, id: &str) -> Result<Option<LocalEntity>, StoreError>;

    async fn entity_by_remote_key(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<LocalEntity>, StoreError>;

    async fn insert_entity(&self, entity: &LocalEntity) -> Result<(), StoreError>;

    async fn save_entity(&self, entity: &LocalEntity) -> Result<(), StoreError>;

    /// Replace the latest registry listing for a site and sync type.
    async fn record_observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        records: &[RemoteRecord],
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// A record from the latest listing.
    async fn observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError>;

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError>;

    /// Matching entries, newest first.
    async fn sync_logs(&self, query: &SyncLogQuery) -> Result<Vec<SyncLogEntry>, StoreError>;
}
