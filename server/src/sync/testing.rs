//! Scriptable registry and store doubles for orchestrator tests.

use super::memory::MemoryStore;
use super::{LocalStore, StoreError};
use crate::registry::{NewRemoteRecord, RegistryClient, RegistryConnector, RegistryError};
use async_trait::async_trait;
use canopy_engine::{
    LocalEntity, RemoteRecord, Site, SyncLogEntry, SyncLogQuery, SyncType, Timestamp,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    listings: HashMap<SyncType, Vec<RemoteRecord>>,
    failing_lists: HashSet<SyncType>,
    all_lists_fail: bool,
    rejected_names: HashSet<String>,
    slow_names: HashMap<String, Duration>,
    creates: usize,
    connects: usize,
}

/// Hands out clients over one shared fake registry.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing of a sync type.
    pub fn list(&self, sync_type: SyncType, records: Vec<RemoteRecord>) {
        self.state.lock().unwrap().listings.insert(sync_type, records);
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().all_lists_fail = true;
    }

    pub fn fail_list_of(&self, sync_type: SyncType) {
        self.state.lock().unwrap().failing_lists.insert(sync_type);
    }

    /// Creates with this display name are refused.
    pub fn reject(&self, name: &str) {
        self.state.lock().unwrap().rejected_names.insert(name.to_string());
    }

    /// Creates with this display name take `delay`.
    pub fn slow(&self, name: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .slow_names
            .insert(name.to_string(), delay);
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }
}

impl RegistryConnector for FakeConnector {
    fn connect(&self, site: &Site) -> Result<Box<dyn RegistryClient>, RegistryError> {
        if site.license_number.is_none() {
            return Err(RegistryError::MissingLicense(site.id.clone()));
        }
        self.state.lock().unwrap().connects += 1;
        Ok(Box::new(FakeClient {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl RegistryClient for FakeClient {
    async fn list_remote_records(
        &self,
        sync_type: SyncType,
    ) -> Result<Vec<RemoteRecord>, RegistryError> {
        let state = self.state.lock().unwrap();
        if state.all_lists_fail || state.failing_lists.contains(&sync_type) {
            return Err(RegistryError::Api {
                status: 503,
                message: "maintenance".into(),
            });
        }
        Ok(state.listings.get(&sync_type).cloned().unwrap_or_default())
    }

    async fn create_remote_record(
        &self,
        sync_type: SyncType,
        record: &NewRemoteRecord,
    ) -> Result<RemoteRecord, RegistryError> {
        let delay = {
            let state = self.state.lock().unwrap();
            if state.rejected_names.contains(&record.display_name) {
                return Err(RegistryError::Rejected(format!(
                    "duplicate name {}",
                    record.display_name
                )));
            }
            state.slow_names.get(&record.display_name).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        let created = RemoteRecord {
            remote_key: format!("R{}", state.creates),
            display_name: record.display_name.clone(),
            fields: record.fields.clone(),
        };
        state
            .listings
            .entry(sync_type)
            .or_default()
            .push(created.clone());
        Ok(created)
    }
}

/// Store operations a [`FlakyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Entities,
    RecordObserved,
    TouchSite,
    AppendSyncLog,
}

/// A [`MemoryStore`] whose chosen operations fail.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<StoreOp>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Mutex::default(),
        }
    }

    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: StoreOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(&op) {
            return Err(StoreError::Corrupt(format!("{op:?} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn site(&self, site_id: &str) -> Result<Option<Site>, StoreError> {
        self.inner.site(site_id).await
    }

    async fn touch_site(&self, site_id: &str, at: Timestamp) -> Result<(), StoreError> {
        self.check(StoreOp::TouchSite)?;
        self.inner.touch_site(site_id, at).await
    }

    async fn entities(
        &self,
        site_id: &str,
        sync_type: SyncType,
    ) -> Result<Vec<LocalEntity>, StoreError> {
        self.check(StoreOp::Entities)?;
        self.inner.entities(site_id, sync_type).await
    }

    async fn entity(&self, id: &str) -> Result<Option<LocalEntity>, StoreError> {
        self.inner.entity(id).await
    }

    async fn entity_by_remote_key(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<LocalEntity>, StoreError> {
        self.inner
            .entity_by_remote_key(site_id, sync_type, remote_key)
            .await
    }

    async fn insert_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        self.inner.insert_entity(entity).await
    }

    async fn save_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        self.inner.save_entity(entity).await
    }

    async fn record_observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        records: &[RemoteRecord],
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::RecordObserved)?;
        self.inner
            .record_observed(site_id, sync_type, records, at)
            .await
    }

    async fn observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        self.inner.observed(site_id, sync_type, remote_key).await
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        self.check(StoreOp::AppendSyncLog)?;
        self.inner.append_sync_log(entry).await
    }

    async fn sync_logs(&self, query: &SyncLogQuery) -> Result<Vec<SyncLogEntry>, StoreError> {
        self.inner.sync_logs(query).await
    }
}
