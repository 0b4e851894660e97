//! Reconciliation orchestration.
//!
//! [`SyncService`] owns the local store, the registry connector and the run
//! registry, and drives the pull and push orchestrators, the linking service
//! and the readiness evaluator.

mod error;
mod link;
mod pull;
mod push;
mod readiness;
mod runs;
mod store;

#[cfg(test)]
pub(crate) mod memory;
#[cfg(test)]
mod scenarios;
#[cfg(test)]
pub(crate) mod testing;

pub use error::SyncError;
pub use runs::{CancelFlag, RunRegistry};
pub use store::{LocalStore, StoreError};

use crate::config::Config;
use crate::registry::{RegistryClient, RegistryConnector};
use canopy_engine::{
    Direction, LinkResult, LocalEntity, ReadinessReport, Room, Site, StalenessPolicy, SyncLogEntry,
    SyncLogQuery, SyncResult, SyncSchema, SyncSummary, SyncType, Timestamp,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Tunables shared by every run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Timeout applied to each registry call
    pub registry_timeout: Duration,
    /// Registry creates in flight per push run
    pub push_concurrency: usize,
    pub staleness: StalenessPolicy,
    pub tag_low_watermark: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            registry_timeout: config.registry.timeout,
            push_concurrency: config.push_concurrency,
            staleness: StalenessPolicy::new(
                u64::try_from(config.stale_after.as_millis()).unwrap_or(u64::MAX),
            ),
            tag_low_watermark: config.tag_low_watermark,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            registry_timeout: Duration::from_secs(15),
            push_concurrency: 4,
            staleness: StalenessPolicy::default(),
            tag_low_watermark: 25,
        }
    }
}

/// Sync state of a site.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSyncStatus {
    pub site: Site,
    pub rooms: Vec<Room>,
    /// Summary over the site's rooms
    pub sync_summary: SyncSummary,
    pub by_type: BTreeMap<SyncType, SyncSummary>,
    /// Sync types with a run in flight
    pub running: Vec<SyncType>,
}

/// Everything one orchestrator run works with.
pub(crate) struct RunContext<'a> {
    pub store: &'a dyn LocalStore,
    pub client: &'a dyn RegistryClient,
    pub schema: &'a SyncSchema,
    pub options: &'a SyncOptions,
    pub site: &'a Site,
    pub sync_type: SyncType,
    pub cancel: &'a CancelFlag,
}

impl RunContext<'_> {
    async fn insert(&self, entity: &mut LocalEntity, now: Timestamp) -> Result<(), StoreError> {
        entity.refresh_status(&self.options.staleness, now);
        self.store.insert_entity(entity).await
    }

    async fn save(&self, entity: &mut LocalEntity, now: Timestamp) -> Result<(), StoreError> {
        entity.refresh_status(&self.options.staleness, now);
        self.store.save_entity(entity).await
    }

    /// Fail when another entity already holds `remote_key`.
    async fn ensure_key_free(&self, remote_key: &str, except: Option<&str>) -> Result<(), StoreError> {
        let holder = self
            .store
            .entity_by_remote_key(self.site.id.as_str(), self.sync_type, remote_key)
            .await?;
        match holder {
            Some(holder) if Some(holder.id.as_str()) != except => {
                Err(StoreError::Engine(canopy_engine::Error::InvariantViolation {
                    remote_key: remote_key.to_string(),
                    holder: holder.id,
                }))
            }
            _ => Ok(()),
        }
    }

    /// Close a run whose items were applied. Items are already committed, so
    /// bookkeeping failures are logged and the result is still returned.
    async fn finish(&self, mut result: SyncResult, started_at: Timestamp) -> SyncResult {
        let site_id = self.site.id.as_str();
        if let Err(e) = self.store.touch_site(site_id, now_ms()).await {
            tracing::warn!(site_id, error = %e, "Failed to update last sync time");
        }
        result.finish(now_ms().saturating_sub(started_at));
        log_finished_run(self.store, &result, started_at).await;
        result
    }

    /// Best effort: remember an item failure on the entity itself.
    async fn record_item_error(&self, local_id: &str, message: &str, now: Timestamp) {
        let outcome = match self.store.entity(local_id).await {
            Ok(Some(mut entity)) => {
                entity.record_error(message, now);
                self.save(&mut entity, now).await
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(local_id, error = %e, "Failed to record item error");
        }
    }
}

/// Runs reconciliation for every site.
pub struct SyncService {
    store: Arc<dyn LocalStore>,
    connector: Arc<dyn RegistryConnector>,
    runs: Arc<RunRegistry>,
    schema: Arc<SyncSchema>,
    options: Arc<SyncOptions>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        connector: Arc<dyn RegistryConnector>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            connector,
            runs: RunRegistry::new_shared(),
            schema: Arc::new(SyncSchema::standard()),
            options: Arc::new(options),
        }
    }

    /// Run one pull or push for a site and sync type.
    ///
    /// Rejects a second run for the same key while one is in flight. The
    /// registry client lives for exactly this run. The run proceeds on its
    /// own task, so it only stops early through [`SyncService::cancel`].
    pub async fn run_sync(
        &self,
        site_id: &str,
        sync_type: SyncType,
        direction: Direction,
    ) -> Result<SyncResult, SyncError> {
        let site = self
            .store
            .site(site_id)
            .await?
            .ok_or_else(|| SyncError::SiteNotFound(site_id.to_string()))?;

        let started_at = now_ms();
        let guard = self
            .runs
            .try_begin(site_id, sync_type, direction, started_at)
            .ok_or_else(|| SyncError::RunInProgress {
                site_id: site_id.to_string(),
                sync_type,
            })?;

        let client = match self.connector.connect(&site) {
            Ok(client) => client,
            Err(e) => {
                let message = e.to_string();
                self.log_failure(&site.id, sync_type, direction, started_at, &message)
                    .await;
                return Err(SyncError::RegistryUnavailable(message));
            }
        };

        // The task owns the run; dropping the caller drops only the response.
        let store = Arc::clone(&self.store);
        let schema = Arc::clone(&self.schema);
        let options = Arc::clone(&self.options);
        let run = tokio::spawn(async move {
            let ctx = RunContext {
                store: store.as_ref(),
                client: client.as_ref(),
                schema: &schema,
                options: &options,
                site: &site,
                sync_type,
                cancel: guard.cancel_flag(),
            };
            match direction {
                Direction::Pull => pull::run(&ctx, started_at).await,
                Direction::Push => push::run(&ctx, started_at).await,
            }
        });

        match run.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(SyncError::Aborted(e.to_string())),
        }
    }

    /// Ask the active run for a key to stop between items.
    pub fn cancel(&self, site_id: &str, sync_type: SyncType) -> bool {
        let cancelled = self.runs.cancel(site_id, sync_type);
        if cancelled {
            tracing::info!(site_id, %sync_type, "Sync run cancellation requested");
        }
        cancelled
    }

    /// Rooms and per-type status summaries, recomputed at read time.
    pub async fn status(&self, site_id: &str) -> Result<SiteSyncStatus, SyncError> {
        let site = self
            .store
            .site(site_id)
            .await?
            .ok_or_else(|| SyncError::SiteNotFound(site_id.to_string()))?;
        let now = now_ms();

        let mut by_type = BTreeMap::new();
        let mut rooms = Vec::new();
        for sync_type in SyncType::ALL {
            let entities = self.entities(site_id, sync_type, now).await?;
            by_type.insert(
                sync_type,
                SyncSummary::from_statuses(entities.iter().map(|e| e.sync_status)),
            );
            if sync_type == SyncType::Locations {
                rooms = entities
                    .iter()
                    .map(Room::from_entity)
                    .collect::<Result<Vec<_>, _>>()?;
            }
        }

        Ok(SiteSyncStatus {
            site,
            rooms,
            sync_summary: by_type
                .get(&SyncType::Locations)
                .copied()
                .unwrap_or_default(),
            by_type,
            running: SyncType::ALL
                .into_iter()
                .filter(|sync_type| self.runs.is_running(site_id, *sync_type))
                .collect(),
        })
    }

    pub async fn logs(&self, query: &SyncLogQuery) -> Result<Vec<SyncLogEntry>, SyncError> {
        Ok(self.store.sync_logs(query).await?)
    }

    /// Bind a local entity to a registry record seen by a prior pull.
    pub async fn link(&self, remote_key: &str, local_id: &str) -> Result<LinkResult, SyncError> {
        link::link(
            self.store.as_ref(),
            &self.options.staleness,
            remote_key,
            local_id,
            now_ms(),
        )
        .await
    }

    /// Evaluate every readiness check for a site.
    pub async fn readiness(&self, site_id: &str) -> Result<ReadinessReport, SyncError> {
        let site = self
            .store
            .site(site_id)
            .await?
            .ok_or_else(|| SyncError::SiteNotFound(site_id.to_string()))?;

        Ok(readiness::evaluate(
            self.store.as_ref(),
            self.connector.as_ref(),
            &site,
            &self.options,
        )
        .await)
    }

    async fn entities(
        &self,
        site_id: &str,
        sync_type: SyncType,
        now: Timestamp,
    ) -> Result<Vec<LocalEntity>, SyncError> {
        let mut entities = self.store.entities(site_id, sync_type).await?;
        for entity in &mut entities {
            entity.refresh_status(&self.options.staleness, now);
        }
        Ok(entities)
    }

    async fn log_failure(
        &self,
        site_id: &str,
        sync_type: SyncType,
        direction: Direction,
        started_at: Timestamp,
        message: &str,
    ) {
        log_failed_run(
            self.store.as_ref(),
            site_id,
            sync_type,
            direction,
            started_at,
            message,
        )
        .await;
    }
}

/// Append a `failed` log entry for a run that made no progress.
pub(crate) async fn log_failed_run(
    store: &dyn LocalStore,
    site_id: &str,
    sync_type: SyncType,
    direction: Direction,
    started_at: Timestamp,
    message: &str,
) {
    tracing::error!(site_id, %sync_type, %direction, error = message, "Sync run failed");

    let entry = SyncLogEntry::failed(
        uuid::Uuid::new_v4().to_string(),
        site_id,
        sync_type,
        direction,
        started_at,
        now_ms(),
        message,
    );
    if let Err(e) = store.append_sync_log(&entry).await {
        tracing::error!(site_id, error = %e, "Failed to write sync log");
    }
}

/// Append the summary entry of a run that reached the item stage.
pub(crate) async fn log_finished_run(
    store: &dyn LocalStore,
    result: &SyncResult,
    started_at: Timestamp,
) {
    let entry = SyncLogEntry::from_result(
        uuid::Uuid::new_v4().to_string(),
        result,
        started_at,
        now_ms(),
    );
    tracing::info!(
        site_id = %result.site_id,
        sync_type = %result.sync_type,
        direction = %result.direction,
        status = ?entry.status,
        found = result.counts.found,
        created = result.counts.created,
        updated = result.counts.updated,
        matched = result.counts.matched,
        orphaned = result.counts.orphaned,
        pushed = result.counts.pushed,
        skipped = result.counts.skipped,
        failed = result.counts.failed,
        duration_ms = result.duration_ms,
        "Sync run finished"
    );
    if let Err(e) = store.append_sync_log(&entry).await {
        tracing::error!(site_id = %result.site_id, error = %e, "Failed to write sync log");
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::testing::FakeConnector;
    use super::*;
    use canopy_engine::{RemoteRecord, SyncStatus};

    #[tokio::test]
    async fn status_lists_rooms_and_summaries() {
        let store = Arc::new(MemoryStore::with_site("site-1", Some("LIC-1")));
        let connector = FakeConnector::new();
        connector.list(SyncType::Locations, vec![RemoteRecord::new("L1", "Room A")]);
        store
            .insert_entity(&LocalEntity::new(
                "room-2",
                "site-1",
                SyncType::Locations,
                "Room B",
                Default::default(),
                1000,
            ))
            .await
            .unwrap();
        let service = SyncService::new(
            store.clone(),
            Arc::new(connector.clone()),
            SyncOptions::default(),
        );
        service
            .run_sync("site-1", SyncType::Locations, Direction::Pull)
            .await
            .unwrap();

        let status = service.status("site-1").await.unwrap();
        assert_eq!(status.rooms.len(), 2);
        assert_eq!(status.sync_summary.total, 2);
        assert_eq!(status.sync_summary.synced, 1);
        assert_eq!(status.sync_summary.not_synced, 1);
        assert_eq!(status.by_type[&SyncType::Strains].total, 0);
        assert!(status.site.last_synced_at.is_some());
        assert!(status.running.is_empty());

        let room_a = status.rooms.iter().find(|r| r.name == "Room A").unwrap();
        assert_eq!(room_a.remote_location_id.as_deref(), Some("L1"));
        assert_eq!(room_a.sync_status, SyncStatus::Synced);

        let logs = service
            .logs(&SyncLogQuery::for_site("site-1"))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn options_follow_config() {
        let config = config(Duration::from_secs(3600));
        let options = SyncOptions::from_config(&config);
        assert_eq!(options.registry_timeout, Duration::from_millis(2500));
        assert_eq!(options.push_concurrency, 8);
        assert_eq!(options.staleness.stale_after_ms, 3_600_000);
        assert_eq!(options.tag_low_watermark, 10);
    }

    #[test]
    fn oversized_stale_window_saturates() {
        let options = SyncOptions::from_config(&config(Duration::MAX));
        assert_eq!(options.staleness.stale_after_ms, u64::MAX);
        assert!(!options.staleness.is_stale(Some(0), u64::MAX));
    }

    fn config(stale_after: Duration) -> Config {
        Config {
            host: "0.0.0.0".into(),
            port: 3000,
            database_url: "postgres://localhost/canopy".into(),
            auth_secret: None,
            registry: crate::config::RegistryConfig {
                base_url: "https://registry.example.com".into(),
                api_key: None,
                timeout: Duration::from_millis(2500),
            },
            push_concurrency: 8,
            stale_after,
            tag_low_watermark: 10,
        }
    }
}
