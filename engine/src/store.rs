//! Store - the in-memory local record container.
//!
//! The Store holds a tenant's local entities together with the last
//! registry listing seen per (site, sync type) and the sync log. Every write
//! goes through a read-then-conditionally-write check on the remote mapping
//! index, so two entities can never hold the same remote key.

use crate::{
    error::Result, EntityId, Error, LocalEntity, RemoteKey, RemoteRecord, Site, SiteId,
    StalenessPolicy, SyncLogEntry, SyncLogQuery, SyncType, Timestamp,
};
use std::collections::{BTreeMap, HashMap};

type MappingKey = (SiteId, SyncType, RemoteKey);

/// The main store holding all local reconciliation state.
#[derive(Debug, Clone, Default)]
pub struct Store {
    policy: StalenessPolicy,
    sites: HashMap<SiteId, Site>,
    entities: HashMap<EntityId, LocalEntity>,
    /// Remote mapping index
    mappings: HashMap<MappingKey, EntityId>,
    /// Latest registry listing per site and sync type
    observed: HashMap<(SiteId, SyncType), BTreeMap<RemoteKey, RemoteRecord>>,
    sync_log: Vec<SyncLogEntry>,
}

fn mapping_key(entity: &LocalEntity) -> Option<MappingKey> {
    entity
        .remote_key()
        .map(|key| (entity.site_id.clone(), entity.sync_type, key.to_string()))
}

impl Store {
    /// Create an empty store with the given staleness policy.
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    // ---- sites ----

    pub fn upsert_site(&mut self, site: Site) {
        self.sites.insert(site.id.clone(), site);
    }

    pub fn site(&self, site_id: &str) -> Option<&Site> {
        self.sites.get(site_id)
    }

    /// Stamp a site's last successful sync.
    pub fn touch_site(&mut self, site_id: &str, timestamp: Timestamp) -> Result<()> {
        let site = self
            .sites
            .get_mut(site_id)
            .ok_or_else(|| Error::SiteNotFound(site_id.to_string()))?;
        site.last_synced_at = Some(timestamp);
        Ok(())
    }

    // ---- entities ----

    /// Get an entity with its status recomputed at `now`.
    pub fn get(&self, id: &str, now: Timestamp) -> Option<LocalEntity> {
        self.entities.get(id).map(|entity| self.refreshed(entity, now))
    }

    /// All entities of one site and sync type, oldest first.
    pub fn list(&self, site_id: &str, sync_type: SyncType, now: Timestamp) -> Vec<LocalEntity> {
        let mut entities: Vec<LocalEntity> = self
            .entities
            .values()
            .filter(|e| e.site_id == site_id && e.sync_type == sync_type)
            .map(|e| self.refreshed(e, now))
            .collect();
        entities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entities
    }

    /// The entity holding a remote key, if any.
    pub fn find_by_remote_key(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
        now: Timestamp,
    ) -> Option<LocalEntity> {
        let key = (site_id.to_string(), sync_type, remote_key.to_string());
        self.mappings
            .get(&key)
            .and_then(|id| self.entities.get(id))
            .map(|entity| self.refreshed(entity, now))
    }

    /// Insert a new entity.
    ///
    /// Rejects an existing ID and a remote key already held by another
    /// entity. Nothing is written on rejection.
    pub fn insert(&mut self, mut entity: LocalEntity, now: Timestamp) -> Result<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(Error::EntityAlreadyExists(entity.id));
        }

        let key = mapping_key(&entity);
        if let Some(key) = &key {
            self.check_mapping_free(key, &entity.id)?;
        }

        entity.refresh_status(&self.policy, now);
        if let Some(key) = key {
            self.mappings.insert(key, entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Replace an existing entity.
    ///
    /// The mapping index follows the new mapping. A remote key held by a
    /// different entity is rejected with [`Error::InvariantViolation`].
    pub fn save(&mut self, mut entity: LocalEntity, now: Timestamp) -> Result<()> {
        let previous = self
            .entities
            .get(&entity.id)
            .ok_or_else(|| Error::EntityNotFound(entity.id.clone()))?;
        let old_key = mapping_key(previous);

        let new_key = mapping_key(&entity);
        if let Some(key) = &new_key {
            self.check_mapping_free(key, &entity.id)?;
        }

        if old_key != new_key {
            if let Some(old) = old_key {
                self.mappings.remove(&old);
            }
            if let Some(new) = new_key {
                self.mappings.insert(new, entity.id.clone());
            }
        }

        entity.refresh_status(&self.policy, now);
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    fn check_mapping_free(&self, key: &MappingKey, id: &str) -> Result<()> {
        match self.mappings.get(key) {
            Some(holder) if holder != id => Err(Error::InvariantViolation {
                remote_key: key.2.clone(),
                holder: holder.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn refreshed(&self, entity: &LocalEntity, now: Timestamp) -> LocalEntity {
        let mut entity = entity.clone();
        entity.refresh_status(&self.policy, now);
        entity
    }

    // ---- registry observations ----

    /// Replace the latest listing for a site and sync type.
    pub fn record_observed(&mut self, site_id: &str, sync_type: SyncType, records: &[RemoteRecord]) {
        let listing = records
            .iter()
            .map(|r| (r.remote_key.clone(), r.clone()))
            .collect();
        self.observed
            .insert((site_id.to_string(), sync_type), listing);
    }

    /// A record from the latest listing.
    pub fn observed(&self, site_id: &str, sync_type: SyncType, remote_key: &str) -> Option<&RemoteRecord> {
        self.observed
            .get(&(site_id.to_string(), sync_type))
            .and_then(|listing| listing.get(remote_key))
    }

    // ---- sync log ----

    pub fn append_log(&mut self, entry: SyncLogEntry) {
        self.sync_log.push(entry);
    }

    /// Matching log entries, newest first.
    pub fn logs(&self, query: &SyncLogQuery) -> Vec<SyncLogEntry> {
        let mut entries: Vec<SyncLogEntry> = self
            .sync_log
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        entries
    }

    /// Number of entities across all sites.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
