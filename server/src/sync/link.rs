//! Manual linking of a local entity to a registry record.

use super::{LocalStore, SyncError};
use canopy_engine::{
    plan_link, Error as EngineError, LinkDecision, LinkResult, StalenessPolicy, Timestamp,
};

/// Bind `local_id` to `remote_key`.
///
/// The record must have been seen by the latest pull of the entity's site
/// and sync type. Repeating a successful link is a no-op. Nothing is written
/// when a rule rejects the request.
pub(super) async fn link(
    store: &dyn LocalStore,
    policy: &StalenessPolicy,
    remote_key: &str,
    local_id: &str,
    now: Timestamp,
) -> Result<LinkResult, SyncError> {
    let mut local = store
        .entity(local_id)
        .await?
        .ok_or_else(|| EngineError::EntityNotFound(local_id.to_string()))?;
    local.refresh_status(policy, now);

    let site_id = local.site_id.clone();
    let sync_type = local.sync_type;

    let observed = store.observed(&site_id, sync_type, remote_key).await?;
    let holder = store
        .entity_by_remote_key(&site_id, sync_type, remote_key)
        .await?;
    let previous_still_observed = match local.remote_key() {
        Some(current) if current != remote_key => {
            store.observed(&site_id, sync_type, current).await?.is_some()
        }
        _ => false,
    };

    let decision = plan_link(
        &local,
        remote_key,
        observed.as_ref(),
        holder.as_ref(),
        previous_still_observed,
    )?;

    match decision {
        LinkDecision::Unchanged => Ok(LinkResult {
            local_entity_id: local.id,
            remote_key: remote_key.to_string(),
            changed: false,
            sync_status: local.sync_status,
        }),
        LinkDecision::Bind(record) => {
            let previous = local.remote_key().map(str::to_string);
            local.bind(&record, now);
            local.refresh_status(policy, now);
            store.save_entity(&local).await?;

            tracing::info!(
                site_id = %site_id,
                %sync_type,
                local_id,
                remote_key,
                previous = ?previous,
                "Entity linked"
            );

            Ok(LinkResult {
                local_entity_id: local.id,
                remote_key: remote_key.to_string(),
                changed: true,
                sync_status: local.sync_status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::memory::MemoryStore;
    use crate::sync::testing::FakeConnector;
    use crate::sync::{LocalStore, SyncError, SyncOptions, SyncService};
    use canopy_engine::{Direction, Error, LocalEntity, RemoteRecord, SyncStatus, SyncType};
    use std::sync::Arc;

    fn room(id: &str, name: &str) -> LocalEntity {
        LocalEntity::new(id, "site-1", SyncType::Locations, name, Default::default(), 1000)
    }

    /// A site whose latest pull saw L1 ("Room A") and L2 ("Room B").
    async fn pulled() -> (Arc<MemoryStore>, FakeConnector, SyncService) {
        let store = Arc::new(MemoryStore::with_site("site-1", Some("LIC-1")));
        let connector = FakeConnector::new();
        let service = SyncService::new(
            store.clone(),
            Arc::new(connector.clone()),
            SyncOptions::default(),
        );
        connector.list(
            SyncType::Locations,
            vec![RemoteRecord::new("L1", "Room A"), RemoteRecord::new("L2", "Room B")],
        );
        service
            .run_sync("site-1", SyncType::Locations, Direction::Pull)
            .await
            .unwrap();
        store.insert_entity(&room("room-x", "Grow Room")).await.unwrap();
        (store, connector, service)
    }

    fn engine_error(err: &SyncError) -> &Error {
        err.engine_error().expect("engine error")
    }

    async fn detach(store: &MemoryStore, remote_key: &str) -> LocalEntity {
        let mut copy = store
            .entity_by_remote_key("site-1", SyncType::Locations, remote_key)
            .await
            .unwrap()
            .unwrap();
        copy.mapping = None;
        store.save_entity(&copy).await.unwrap();
        copy
    }

    #[tokio::test]
    async fn link_binds_and_repeats_as_noop() {
        let (store, _connector, service) = pulled().await;
        detach(&store, "L2").await;

        let first = service.link("L2", "room-x").await.unwrap();
        assert!(first.changed);
        assert_eq!(first.local_entity_id, "room-x");
        assert_eq!(first.sync_status, SyncStatus::Synced);

        let linked = store.entity("room-x").await.unwrap().unwrap();
        assert_eq!(linked.remote_key(), Some("L2"));
        assert_eq!(
            linked.mapping.as_ref().unwrap().remote_name.as_deref(),
            Some("Room B")
        );

        let again = service.link("L2", "room-x").await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn held_key_is_already_linked() {
        let (store, _connector, service) = pulled().await;
        let holder = store
            .entity_by_remote_key("site-1", SyncType::Locations, "L1")
            .await
            .unwrap()
            .unwrap();

        let err = service.link("L1", "room-x").await.unwrap_err();
        assert!(matches!(
            engine_error(&err),
            Error::AlreadyLinked { local_id, .. } if *local_id == holder.id
        ));
        assert!(!store.entity("room-x").await.unwrap().unwrap().is_mapped());
    }

    #[tokio::test]
    async fn unobserved_key_is_not_eligible() {
        let (store, _connector, service) = pulled().await;
        let err = service.link("L9", "room-x").await.unwrap_err();
        assert!(matches!(engine_error(&err), Error::NotEligible(key) if key == "L9"));
        assert!(!store.entity("room-x").await.unwrap().unwrap().is_mapped());
    }

    #[tokio::test]
    async fn unknown_entity() {
        let (_store, _connector, service) = pulled().await;
        let err = service.link("L1", "missing").await.unwrap_err();
        assert!(matches!(engine_error(&err), Error::EntityNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn live_mapping_is_not_overwritten() {
        let (store, _connector, service) = pulled().await;
        let room_a = store
            .entity_by_remote_key("site-1", SyncType::Locations, "L1")
            .await
            .unwrap()
            .unwrap();
        let room_b = store
            .entity_by_remote_key("site-1", SyncType::Locations, "L2")
            .await
            .unwrap()
            .unwrap();

        // L2 is still in the listing and belongs to Room B
        let err = service.link("L2", &room_a.id).await.unwrap_err();
        assert!(matches!(engine_error(&err), Error::AlreadyLinked { .. }));

        let unchanged = store.entity(&room_a.id).await.unwrap().unwrap();
        assert_eq!(unchanged.remote_key(), Some("L1"));
        assert_eq!(
            store.entity(&room_b.id).await.unwrap().unwrap().remote_key(),
            Some("L2")
        );
    }

    #[tokio::test]
    async fn orphan_can_be_relinked() {
        let (store, connector, service) = pulled().await;
        let room_b = store
            .entity_by_remote_key("site-1", SyncType::Locations, "L2")
            .await
            .unwrap()
            .unwrap();

        // L2 disappears; a record named differently takes its place
        connector.list(
            SyncType::Locations,
            vec![RemoteRecord::new("L1", "Room A"), RemoteRecord::new("L5", "Room B2")],
        );
        service
            .run_sync("site-1", SyncType::Locations, Direction::Pull)
            .await
            .unwrap();
        assert!(store.entity(&room_b.id).await.unwrap().unwrap().orphaned);

        // the pull created a local copy of L5, so move it off first
        let err = service.link("L5", &room_b.id).await.unwrap_err();
        assert!(matches!(engine_error(&err), Error::AlreadyLinked { .. }));
        detach(&store, "L5").await;

        let result = service.link("L5", &room_b.id).await.unwrap();
        assert!(result.changed);
        assert_eq!(result.sync_status, SyncStatus::Synced);

        let relinked = store.entity(&room_b.id).await.unwrap().unwrap();
        assert_eq!(relinked.remote_key(), Some("L5"));
        assert!(!relinked.orphaned);
    }

    #[tokio::test]
    async fn relink_of_live_mapping_conflicts() {
        let (store, connector, service) = pulled().await;
        let room_a = store
            .entity_by_remote_key("site-1", SyncType::Locations, "L1")
            .await
            .unwrap()
            .unwrap();

        // L6 is listed but its pulled copy is detached, so nobody holds it
        connector.list(
            SyncType::Locations,
            vec![
                RemoteRecord::new("L1", "Room A"),
                RemoteRecord::new("L2", "Room B"),
                RemoteRecord::new("L6", "Room F"),
            ],
        );
        service
            .run_sync("site-1", SyncType::Locations, Direction::Pull)
            .await
            .unwrap();
        detach(&store, "L6").await;

        let err = service.link("L6", &room_a.id).await.unwrap_err();
        assert!(matches!(
            engine_error(&err),
            Error::MappingConflict { remote_key, .. } if remote_key == "L1"
        ));
        assert_eq!(
            store.entity(&room_a.id).await.unwrap().unwrap().remote_key(),
            Some("L1")
        );
    }
}
