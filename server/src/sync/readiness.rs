//! Push readiness for a site.
//!
//! Every category runs concurrently and on its own. A check that cannot
//! execute becomes a `fail` check instead of an error, so one broken
//! category never hides the others.

use super::{LocalStore, StoreError, SyncOptions};
use crate::registry::{with_timeout, RegistryClient, RegistryConnector, RegistryError};
use canopy_engine::readiness::{
    evaluate_batch_tags, evaluate_coverage, evaluate_cultivars_linked, evaluate_tags,
};
use canopy_engine::{
    Batch, CheckCategory, Cultivar, LocalEntity, ReadinessCheck, ReadinessReport, Site, Tag,
};
use futures::future::join_all;

#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] canopy_engine::Error),
}

pub(super) async fn evaluate(
    store: &dyn LocalStore,
    connector: &dyn RegistryConnector,
    site: &Site,
    options: &SyncOptions,
) -> ReadinessReport {
    let client = connector.connect(site).map_err(|e| e.to_string());
    let client = client.as_ref().map(|c| c.as_ref()).map_err(String::as_str);

    let checks = join_all(CheckCategory::ALL.into_iter().map(|category| async move {
        match run_check(category, store, client, site, options).await {
            Ok(check) => check,
            Err(e) => {
                tracing::warn!(
                    site_id = %site.id,
                    category = category.label(),
                    error = %e,
                    "Readiness check could not run"
                );
                ReadinessCheck::fail(category, format!("Could not check {}: {e}", category.label()))
            }
        }
    }))
    .await;

    let report = ReadinessReport::from_checks(checks);
    tracing::debug!(site_id = %site.id, ready = report.ready, "Readiness evaluated");
    report
}

async fn run_check(
    category: CheckCategory,
    store: &dyn LocalStore,
    client: Result<&dyn RegistryClient, &str>,
    site: &Site,
    options: &SyncOptions,
) -> Result<ReadinessCheck, CheckError> {
    let sync_type = category.sync_type();
    let local = local_entities(store, site, options, category).await?;

    let check = match category {
        CheckCategory::LocationsSynced | CheckCategory::StrainsSynced | CheckCategory::ItemsSynced => {
            let client = client.map_err(|e| CheckError::Unavailable(e.to_string()))?;
            let remote =
                with_timeout(options.registry_timeout, client.list_remote_records(sync_type))
                    .await?;
            evaluate_coverage(category, &remote, &local)
        }
        CheckCategory::TagsAvailable => {
            let tags = local.iter().map(Tag::from_entity).collect::<Result<Vec<_>, _>>()?;
            evaluate_tags(&tags, options.tag_low_watermark)
        }
        CheckCategory::CultivarsLinked => {
            let cultivars = local
                .iter()
                .map(Cultivar::from_entity)
                .collect::<Result<Vec<_>, _>>()?;
            evaluate_cultivars_linked(&cultivars)
        }
        CheckCategory::BatchesTagComplete => {
            let batches = local
                .iter()
                .map(Batch::from_entity)
                .collect::<Result<Vec<_>, _>>()?;
            evaluate_batch_tags(&batches)
        }
    };
    Ok(check)
}

async fn local_entities(
    store: &dyn LocalStore,
    site: &Site,
    options: &SyncOptions,
    category: CheckCategory,
) -> Result<Vec<LocalEntity>, StoreError> {
    let now = super::now_ms();
    let mut entities = store.entities(&site.id, category.sync_type()).await?;
    for entity in &mut entities {
        entity.refresh_status(&options.staleness, now);
    }
    Ok(entities)
}
