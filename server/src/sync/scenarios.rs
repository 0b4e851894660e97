//! Multi-run reconciliation scenarios driven through [`SyncService`].

use super::memory::MemoryStore;
use super::testing::FakeConnector;
use super::{LocalStore, SyncOptions, SyncService};
use canopy_engine::{
    Direction, Error, LocalEntity, RemoteRecord, SyncLogQuery, SyncResult, SyncStatus, SyncType,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn room(id: &str, name: &str) -> LocalEntity {
    LocalEntity::new(id, "site-1", SyncType::Locations, name, Default::default(), 1000)
}

fn setup() -> (Arc<MemoryStore>, FakeConnector, SyncService) {
    let store = Arc::new(MemoryStore::with_site("site-1", Some("LIC-1")));
    let connector = FakeConnector::new();
    let service = SyncService::new(
        store.clone(),
        Arc::new(connector.clone()),
        SyncOptions::default(),
    );
    (store, connector, service)
}

async fn pull(
    service: &SyncService,
    connector: &FakeConnector,
    listing: Vec<RemoteRecord>,
) -> SyncResult {
    connector.list(SyncType::Locations, listing);
    service
        .run_sync("site-1", SyncType::Locations, Direction::Pull)
        .await
        .unwrap()
}

async fn by_key(store: &MemoryStore, key: &str) -> LocalEntity {
    store
        .entity_by_remote_key("site-1", SyncType::Locations, key)
        .await
        .unwrap()
        .unwrap()
}

/// Remote keys held by more than one room.
async fn shared_keys(store: &MemoryStore) -> Vec<String> {
    let mut seen = HashSet::new();
    store
        .entities("site-1", SyncType::Locations)
        .await
        .unwrap()
        .iter()
        .filter_map(|e| e.remote_key())
        .filter(|key| !seen.insert(key.to_string()))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn reappearing_record_clears_orphan() {
    let (store, connector, service) = setup();
    pull(&service, &connector, vec![RemoteRecord::new("L1", "Room A")]).await;
    let gone = pull(&service, &connector, vec![]).await;
    assert_eq!(gone.counts.orphaned, 1);

    let back = pull(&service, &connector, vec![RemoteRecord::new("L1", "Room A")]).await;
    assert_eq!(back.counts.created, 0);

    let entity = by_key(&store, "L1").await;
    assert!(!entity.orphaned);
    assert_eq!(entity.sync_status, SyncStatus::Synced);
    assert_eq!(store.entities("site-1", SyncType::Locations).await.unwrap().len(), 1);
}

#[tokio::test]
async fn renamed_remote_is_updated_not_duplicated() {
    let (store, connector, service) = setup();
    pull(&service, &connector, vec![RemoteRecord::new("L1", "Room A")]).await;

    let result = pull(&service, &connector, vec![RemoteRecord::new("L1", "Flower Room")]).await;
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.counts.created, 0);
    assert_eq!(by_key(&store, "L1").await.name, "Flower Room");
    assert_eq!(store.entities("site-1", SyncType::Locations).await.unwrap().len(), 1);
}

#[tokio::test]
async fn untracked_fields_are_not_stored() {
    let (store, connector, service) = setup();
    pull(
        &service,
        &connector,
        vec![RemoteRecord::new("L1", "Room A")
            .with_field("roomType", json!("flower"))
            .with_field("licenseNumber", json!("LIC-1"))],
    )
    .await;

    let entity = by_key(&store, "L1").await;
    assert_eq!(entity.fields.get("roomType"), Some(&json!("flower")));
    assert!(entity.fields.get("licenseNumber").is_none());
}

#[tokio::test]
async fn keys_with_special_characters() {
    let (store, connector, service) = setup();
    let keys = ["L-1", "L_1", "L.1", "L:1", "L/1", "L 1"];
    let listing = keys
        .iter()
        .map(|k| RemoteRecord::new(*k, format!("Room {k}")))
        .collect();

    let result = pull(&service, &connector, listing).await;
    assert_eq!(result.counts.created, keys.len());
    for key in keys {
        assert_eq!(by_key(&store, key).await.name, format!("Room {key}"));
    }
}

#[tokio::test]
async fn link_cannot_steal_a_pulled_mapping() {
    let (store, connector, service) = setup();
    store.insert_entity(&room("room-1", "Room A")).await.unwrap();
    store.insert_entity(&room("room-2", "Other")).await.unwrap();
    pull(&service, &connector, vec![RemoteRecord::new("L1", "Room A")]).await;

    let err = service.link("L1", "room-2").await.unwrap_err();
    assert_eq!(
        err.engine_error(),
        Some(&Error::AlreadyLinked {
            remote_key: "L1".into(),
            local_id: "room-1".into(),
        })
    );
    assert!(shared_keys(&store).await.is_empty());
    assert!(!store.entity("room-2").await.unwrap().unwrap().is_mapped());
}

#[tokio::test]
async fn many_entities() {
    let (store, connector, service) = setup();
    let listing = (0..1000)
        .map(|i| RemoteRecord::new(format!("L{i}"), format!("Room {i}")))
        .collect();

    let result = pull(&service, &connector, listing).await;
    assert_eq!(result.counts.created, 1000);
    assert_eq!(store.entities("site-1", SyncType::Locations).await.unwrap().len(), 1000);

    let status = service.status("site-1").await.unwrap();
    assert_eq!(status.sync_summary.total, 1000);
    assert_eq!(status.sync_summary.synced, 1000);
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    enum Step {
        /// Registry listing as key -> name suffix
        Pull(BTreeMap<u8, u8>),
        Link(u8, u8),
        Insert(u8),
        Push,
    }

    fn arb_listing() -> impl Strategy<Value = BTreeMap<u8, u8>> {
        prop::collection::btree_map(0u8..6, 0u8..4, 0..6)
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => arb_listing().prop_map(Step::Pull),
            2 => (0u8..6, 0u8..8).prop_map(|(key, local)| Step::Link(key, local)),
            2 => (0u8..4).prop_map(Step::Insert),
            1 => Just(Step::Push),
        ]
    }

    fn listing(records: &BTreeMap<u8, u8>) -> Vec<RemoteRecord> {
        records
            .iter()
            .map(|(key, name)| RemoteRecord::new(format!("L{key}"), format!("Room {name}")))
            .collect()
    }

    fn block_on<F>(test: F) -> Result<(), TestCaseError>
    where
        F: std::future::Future<Output = Result<(), TestCaseError>>,
    {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(test)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_at_most_one_mapping(steps in prop::collection::vec(arb_step(), 1..16)) {
            block_on(async {
                let (store, connector, service) = setup();
                let mut inserted = 0u32;
                let mut runs = 0usize;

                for step in steps {
                    match step {
                        Step::Pull(records) => {
                            let result = pull(&service, &connector, listing(&records)).await;
                            prop_assert_eq!(result.counts.failed, 0, "{:?}", result.errors);
                            runs += 1;
                        }
                        Step::Push => {
                            let result = service
                                .run_sync("site-1", SyncType::Locations, Direction::Push)
                                .await
                                .unwrap();
                            prop_assert_eq!(result.counts.failed, 0, "{:?}", result.errors);
                            runs += 1;
                        }
                        Step::Link(key, local) => {
                            let linked = service
                                .link(&format!("L{key}"), &format!("room-{local}"))
                                .await;
                            if let Err(err) = linked {
                                let rejected_by_rule = matches!(
                                    err.engine_error(),
                                    Some(
                                        Error::AlreadyLinked { .. }
                                            | Error::NotEligible(_)
                                            | Error::MappingConflict { .. }
                                            | Error::EntityNotFound(_)
                                    )
                                );
                                prop_assert!(rejected_by_rule, "unexpected link error: {}", err);
                            }
                        }
                        Step::Insert(name) => {
                            store
                                .insert_entity(&room(&format!("room-{inserted}"), &format!("Room {name}")))
                                .await
                                .unwrap();
                            inserted += 1;
                        }
                    }

                    let shared = shared_keys(&store).await;
                    prop_assert!(shared.is_empty(), "keys held twice: {:?}", shared);
                    let logs = store.sync_logs(&SyncLogQuery::for_site("site-1")).await.unwrap();
                    prop_assert_eq!(logs.len(), runs);
                }
                Ok(())
            })?;
        }

        #[test]
        fn prop_pull_is_idempotent(
            records in arb_listing(),
            locals in prop::collection::vec(0u8..4, 0..4),
        ) {
            block_on(async {
                let (store, connector, service) = setup();
                for (i, name) in locals.iter().enumerate() {
                    store
                        .insert_entity(&room(&format!("room-{i}"), &format!("Room {name}")))
                        .await
                        .unwrap();
                }

                pull(&service, &connector, listing(&records)).await;
                let count = store.entities("site-1", SyncType::Locations).await.unwrap().len();
                let second = pull(&service, &connector, listing(&records)).await;

                prop_assert_eq!(second.counts.created, 0);
                prop_assert_eq!(second.counts.updated, 0);
                prop_assert_eq!(second.counts.failed, 0);
                prop_assert_eq!(second.counts.matched, second.counts.found);
                prop_assert_eq!(
                    store.entities("site-1", SyncType::Locations).await.unwrap().len(),
                    count
                );
                Ok(())
            })?;
        }
    }
}
