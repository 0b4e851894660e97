//! In-memory [`LocalStore`] for tests.

use super::{now_ms, LocalStore, StoreError};
use async_trait::async_trait;
use canopy_engine::{
    LocalEntity, RemoteRecord, Site, StalenessPolicy, Store, SyncLogEntry, SyncLogQuery, SyncType,
    Timestamp,
};
use tokio::sync::Mutex;

pub struct MemoryStore {
    inner: Mutex<Store>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Store::new(StalenessPolicy::default())),
        }
    }

    /// A store holding one site.
    pub fn with_site(site_id: &str, license_number: Option<&str>) -> Self {
        let mut site = Site::new(site_id, format!("Site {site_id}"));
        if let Some(license) = license_number {
            site = site.with_license(license);
        }
        let mut inner = Store::new(StalenessPolicy::default());
        inner.upsert_site(site);
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn site(&self, site_id: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.inner.lock().await.site(site_id).cloned())
    }

    async fn touch_site(&self, site_id: &str, at: Timestamp) -> Result<(), StoreError> {
        Ok(self.inner.lock().await.touch_site(site_id, at)?)
    }

    async fn entities(
        &self,
        site_id: &str,
        sync_type: SyncType,
    ) -> Result<Vec<LocalEntity>, StoreError> {
        Ok(self.inner.lock().await.list(site_id, sync_type, now_ms()))
    }

    async fn entity(&self, id: &str) -> Result<Option<LocalEntity>, StoreError> {
        Ok(self.inner.lock().await.get(id, now_ms()))
    }

    async fn entity_by_remote_key(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<LocalEntity>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .find_by_remote_key(site_id, sync_type, remote_key, now_ms()))
    }

    async fn insert_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        Ok(self.inner.lock().await.insert(entity.clone(), now_ms())?)
    }

    async fn save_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        Ok(self.inner.lock().await.save(entity.clone(), now_ms())?)
    }

    async fn record_observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        records: &[RemoteRecord],
        _at: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .record_observed(site_id, sync_type, records);
        Ok(())
    }

    async fn observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .observed(site_id, sync_type, remote_key)
            .cloned())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        self.inner.lock().await.append_log(entry.clone());
        Ok(())
    }

    async fn sync_logs(&self, query: &SyncLogQuery) -> Result<Vec<SyncLogEntry>, StoreError> {
        Ok(self.inner.lock().await.logs(query))
    }
}
