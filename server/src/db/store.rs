//! [`LocalStore`] over PostgreSQL.

use super::{entities, is_unique_violation, observations, sites, sync_logs, violated_constraint, Pool};
use crate::sync::{LocalStore, StoreError};
use async_trait::async_trait;
use canopy_engine::{
    Error as EngineError, LocalEntity, RemoteRecord, Site, SyncLogEntry, SyncLogQuery, SyncType,
    Timestamp,
};

const ENTITY_PKEY: &str = "local_entities_pkey";

/// The production local store.
///
/// The partial unique index on `(site_id, sync_type, remote_key)` backs the
/// at-most-one-mapping rule; a write that trips it is reported as
/// [`EngineError::InvariantViolation`].
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Translate a unique violation on a mapping write.
    async fn mapping_error(&self, entity: &LocalEntity, e: sqlx::Error) -> StoreError {
        if !is_unique_violation(&e) {
            return StoreError::Database(e);
        }
        if violated_constraint(&e) == Some(ENTITY_PKEY) {
            return EngineError::EntityAlreadyExists(entity.id.clone()).into();
        }

        let Some(remote_key) = entity.remote_key() else {
            return StoreError::Database(e);
        };
        let holder = entities::get_entity_by_remote_key(
            &self.pool,
            &entity.site_id,
            entity.sync_type,
            remote_key,
        )
        .await
        .ok()
        .flatten()
        .map(|row| row.id)
        .unwrap_or_default();

        tracing::warn!(
            local_id = %entity.id,
            remote_key,
            holder = %holder,
            "Rejected duplicate remote mapping"
        );
        EngineError::InvariantViolation {
            remote_key: remote_key.to_string(),
            holder,
        }
        .into()
    }
}

#[async_trait]
impl LocalStore for PgStore {
    async fn site(&self, site_id: &str) -> Result<Option<Site>, StoreError> {
        sites::get_site(&self.pool, site_id)
            .await?
            .map(|row| row.to_site())
            .transpose()
    }

    async fn touch_site(&self, site_id: &str, at: Timestamp) -> Result<(), StoreError> {
        if sites::touch_site(&self.pool, site_id, at).await? {
            Ok(())
        } else {
            Err(EngineError::SiteNotFound(site_id.to_string()).into())
        }
    }

    async fn entities(
        &self,
        site_id: &str,
        sync_type: SyncType,
    ) -> Result<Vec<LocalEntity>, StoreError> {
        entities::list_entities(&self.pool, site_id, sync_type)
            .await?
            .into_iter()
            .map(|row| row.to_entity())
            .collect()
    }

    async fn entity(&self, id: &str) -> Result<Option<LocalEntity>, StoreError> {
        entities::get_entity(&self.pool, id)
            .await?
            .map(|row| row.to_entity())
            .transpose()
    }

    async fn entity_by_remote_key(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<LocalEntity>, StoreError> {
        entities::get_entity_by_remote_key(&self.pool, site_id, sync_type, remote_key)
            .await?
            .map(|row| row.to_entity())
            .transpose()
    }

    async fn insert_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        match entities::insert_entity(&self.pool, entity).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.mapping_error(entity, e).await),
        }
    }

    async fn save_entity(&self, entity: &LocalEntity) -> Result<(), StoreError> {
        match entities::update_entity(&self.pool, entity).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::EntityNotFound(entity.id.clone()).into()),
            Err(e) => Err(self.mapping_error(entity, e).await),
        }
    }

    async fn record_observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        records: &[RemoteRecord],
        at: Timestamp,
    ) -> Result<(), StoreError> {
        observations::replace_observations(&self.pool, site_id, sync_type, records, at).await?;
        Ok(())
    }

    async fn observed(
        &self,
        site_id: &str,
        sync_type: SyncType,
        remote_key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        observations::get_observation(&self.pool, site_id, sync_type, remote_key)
            .await?
            .map(|row| row.to_remote_record())
            .transpose()
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        sync_logs::insert_sync_log(&self.pool, entry).await
    }

    async fn sync_logs(&self, query: &SyncLogQuery) -> Result<Vec<SyncLogEntry>, StoreError> {
        sync_logs::query_sync_logs(&self.pool, query)
            .await?
            .into_iter()
            .map(|row| row.to_entry())
            .collect()
    }
}
