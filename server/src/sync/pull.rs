//! Pull: registry listing into local records.

use super::{log_failed_run, now_ms, RunContext, StoreError, SyncError};
use crate::registry::with_timeout;
use canopy_engine::{
    Direction, Error as EngineError, ItemOutcome, ItemStatus, LocalEntity, MatchItem, MatchKind,
    Matcher, RemoteRecord, SyncResult, Timestamp,
};

/// Run one pull.
///
/// A failed listing, or a store failure before the first item, aborts the
/// run with a `failed` log entry. After that each item is applied on its
/// own: a failing item is recorded and the rest go on.
pub(super) async fn run(ctx: &RunContext<'_>, started_at: Timestamp) -> Result<SyncResult, SyncError> {
    let site_id = ctx.site.id.as_str();
    let sync_type = ctx.sync_type;

    tracing::info!(site_id, %sync_type, "Pull started");

    let listing = with_timeout(
        ctx.options.registry_timeout,
        ctx.client.list_remote_records(sync_type),
    )
    .await;
    let remote = match listing {
        Ok(remote) => remote,
        Err(e) => {
            let message = e.to_string();
            log_failed_run(ctx.store, site_id, sync_type, Direction::Pull, started_at, &message)
                .await;
            return Err(SyncError::RegistryUnavailable(message));
        }
    };

    let now = now_ms();
    let local = match observe(ctx, &remote, now).await {
        Ok(local) => local,
        Err(e) => {
            log_failed_run(ctx.store, site_id, sync_type, Direction::Pull, started_at, &e.to_string())
                .await;
            return Err(e.into());
        }
    };

    let matched = Matcher::new(ctx.schema, sync_type).run(&remote, &local);
    tracing::debug!(
        site_id,
        %sync_type,
        found = matched.counts.found,
        created = matched.counts.created,
        updated = matched.counts.updated,
        matched = matched.counts.matched,
        orphaned = matched.counts.orphaned,
        "Listing matched"
    );

    let mut result = SyncResult::new(site_id, sync_type, Direction::Pull);
    result.counts.found = matched.counts.found;

    for item in &matched.items {
        if ctx.cancel.is_cancelled() {
            tracing::info!(site_id, %sync_type, "Pull cancelled");
            result.mark_cancelled();
            break;
        }

        let outcome = match apply_item(ctx, item, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                let name = item_name(item, &local);
                tracing::warn!(site_id, %sync_type, item = %name, error = %message, "Pull item failed");
                if let Some(local_id) = &item.local_id {
                    ctx.record_item_error(local_id, &message, now).await;
                }
                ItemOutcome::new(
                    ItemStatus::Failed,
                    name,
                    item.local_id.clone(),
                    item.remote.as_ref().map(|r| r.remote_key.clone()),
                )
                .with_message(message)
            }
        };
        result.record(outcome);
    }

    Ok(ctx.finish(result, started_at).await)
}

/// Current local records, and the listing remembered for linking.
async fn observe(
    ctx: &RunContext<'_>,
    remote: &[RemoteRecord],
    now: Timestamp,
) -> Result<Vec<LocalEntity>, StoreError> {
    let site_id = ctx.site.id.as_str();
    let local = ctx.store.entities(site_id, ctx.sync_type).await?;
    ctx.store
        .record_observed(site_id, ctx.sync_type, remote, now)
        .await?;
    Ok(local)
}

async fn apply_item(
    ctx: &RunContext<'_>,
    item: &MatchItem,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    match (item.kind, &item.remote, &item.local_id) {
        (MatchKind::Created, Some(remote), None) => create(ctx, remote, now).await,
        (MatchKind::Orphaned, None, Some(local_id)) => orphan(ctx, local_id, now).await,
        (MatchKind::Matched, Some(remote), Some(local_id)) if item.bound_by_name => {
            bind_by_name(ctx, remote, local_id, now).await
        }
        (MatchKind::Updated, Some(remote), Some(local_id)) => {
            update(ctx, remote, local_id, now).await
        }
        (MatchKind::Matched, Some(remote), Some(local_id)) => {
            confirm(ctx, remote, local_id, now).await
        }
        _ => Err(EngineError::InvalidPayload(format!("malformed match item: {:?}", item.kind)).into()),
    }
}

async fn create(
    ctx: &RunContext<'_>,
    remote: &RemoteRecord,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    ctx.schema.validate_fields(ctx.sync_type, &remote.fields)?;
    ctx.ensure_key_free(&remote.remote_key, None).await?;

    let tracked = ctx.schema.project(ctx.sync_type, &remote.fields);
    let mut entity = LocalEntity::from_remote(
        uuid::Uuid::new_v4().to_string(),
        ctx.site.id.as_str(),
        ctx.sync_type,
        remote,
        tracked,
        now,
    );
    ctx.insert(&mut entity, now).await?;

    Ok(ItemOutcome::new(
        ItemStatus::Created,
        &entity.name,
        Some(entity.id.clone()),
        Some(remote.remote_key.clone()),
    ))
}

async fn update(
    ctx: &RunContext<'_>,
    remote: &RemoteRecord,
    local_id: &str,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    ctx.schema.validate_fields(ctx.sync_type, &remote.fields)?;
    let mut entity = mapped_entity(ctx, remote, local_id).await?;

    let tracked = ctx.schema.project(ctx.sync_type, &remote.fields);
    entity.apply_remote(remote, tracked, now);
    entity.confirm(now);
    ctx.save(&mut entity, now).await?;

    Ok(ItemOutcome::new(
        ItemStatus::Updated,
        &entity.name,
        Some(entity.id.clone()),
        Some(remote.remote_key.clone()),
    ))
}

async fn confirm(
    ctx: &RunContext<'_>,
    remote: &RemoteRecord,
    local_id: &str,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    let mut entity = mapped_entity(ctx, remote, local_id).await?;
    entity.confirm(now);
    ctx.save(&mut entity, now).await?;

    Ok(ItemOutcome::new(
        ItemStatus::Matched,
        &entity.name,
        Some(entity.id.clone()),
        Some(remote.remote_key.clone()),
    ))
}

async fn bind_by_name(
    ctx: &RunContext<'_>,
    remote: &RemoteRecord,
    local_id: &str,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    ctx.schema.validate_fields(ctx.sync_type, &remote.fields)?;
    let mut entity = load(ctx, local_id).await?;

    // Mapped by someone else since the listing was matched.
    if let Some(current) = entity.remote_key() {
        if current != remote.remote_key {
            return Err(EngineError::MappingConflict {
                local_id: entity.id.clone(),
                remote_key: current.to_string(),
            }
            .into());
        }
    }
    ctx.ensure_key_free(&remote.remote_key, Some(local_id)).await?;

    let tracked = ctx.schema.project(ctx.sync_type, &remote.fields);
    entity.bind(remote, now);
    entity.apply_remote(remote, tracked, now);
    ctx.save(&mut entity, now).await?;

    Ok(ItemOutcome::new(
        ItemStatus::Matched,
        &entity.name,
        Some(entity.id.clone()),
        Some(remote.remote_key.clone()),
    ))
}

async fn orphan(
    ctx: &RunContext<'_>,
    local_id: &str,
    now: Timestamp,
) -> Result<ItemOutcome, SyncError> {
    let mut entity = load(ctx, local_id).await?;
    entity.mark_orphaned(now);
    ctx.save(&mut entity, now).await?;

    tracing::debug!(local_id, remote_key = ?entity.remote_key(), "Mapped record missing from registry");

    Ok(ItemOutcome::new(
        ItemStatus::Orphaned,
        &entity.name,
        Some(entity.id.clone()),
        entity.remote_key().map(str::to_string),
    ))
}

async fn load(ctx: &RunContext<'_>, local_id: &str) -> Result<LocalEntity, SyncError> {
    ctx.store
        .entity(local_id)
        .await?
        .ok_or_else(|| EngineError::EntityNotFound(local_id.to_string()).into())
}

/// Re-read an entity and check it still holds the record's key.
async fn mapped_entity(
    ctx: &RunContext<'_>,
    remote: &RemoteRecord,
    local_id: &str,
) -> Result<LocalEntity, SyncError> {
    let entity = load(ctx, local_id).await?;
    if entity.remote_key() != Some(remote.remote_key.as_str()) {
        return Err(EngineError::MappingConflict {
            local_id: entity.id.clone(),
            remote_key: remote.remote_key.clone(),
        }
        .into());
    }
    Ok(entity)
}

fn item_name(item: &MatchItem, local: &[LocalEntity]) -> String {
    if let Some(remote) = &item.remote {
        return remote.display_name.clone();
    }
    item.local_id
        .as_ref()
        .and_then(|id| local.iter().find(|e| &e.id == id))
        .map(|e| e.name.clone())
        .unwrap_or_default()
}
