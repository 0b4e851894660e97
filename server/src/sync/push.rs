//! Push: unmapped local records into the registry.

use super::{log_failed_run, now_ms, RunContext, SyncError};
use crate::registry::{with_timeout, NewRemoteRecord};
use canopy_engine::{
    Direction, Error as EngineError, ItemOutcome, ItemStatus, LocalEntity, RemoteRecord,
    SyncResult, Timestamp,
};
use futures::stream::{self, StreamExt};

/// Run one push.
///
/// Every unmapped entity is a candidate. Creates run concurrently up to the
/// configured fan-out; results are folded into the run after all of them
/// settle. A failing candidate never stops the others.
pub(super) async fn run(ctx: &RunContext<'_>, started_at: Timestamp) -> Result<SyncResult, SyncError> {
    let site_id = ctx.site.id.as_str();
    let sync_type = ctx.sync_type;

    let candidates: Vec<LocalEntity> = match ctx.store.entities(site_id, sync_type).await {
        Ok(entities) => entities.into_iter().filter(|e| !e.is_mapped()).collect(),
        Err(e) => {
            log_failed_run(ctx.store, site_id, sync_type, Direction::Push, started_at, &e.to_string())
                .await;
            return Err(e.into());
        }
    };

    tracing::info!(site_id, %sync_type, candidates = candidates.len(), "Push started");

    let pending: Vec<_> = candidates
        .iter()
        .enumerate()
        .map(|(index, entity)| async move { (index, push_item(ctx, entity).await) })
        .collect();
    let mut settled: Vec<(usize, Option<ItemOutcome>)> = stream::iter(pending)
        .buffer_unordered(ctx.options.push_concurrency.max(1))
        .collect()
        .await;
    settled.sort_by_key(|(index, _)| *index);

    let mut result = SyncResult::new(site_id, sync_type, Direction::Push);
    result.counts.found = candidates.len();
    for (_, outcome) in settled {
        match outcome {
            Some(outcome) => result.record(outcome),
            None => result.mark_cancelled(),
        }
    }
    if result.cancelled {
        tracing::info!(site_id, %sync_type, "Push cancelled");
    }

    Ok(ctx.finish(result, started_at).await)
}

/// Push one candidate. `None` when the run was cancelled before it started.
async fn push_item(ctx: &RunContext<'_>, entity: &LocalEntity) -> Option<ItemOutcome> {
    if ctx.cancel.is_cancelled() {
        return None;
    }

    let outcome = |status| ItemOutcome::new(status, &entity.name, Some(entity.id.clone()), None);

    if let Some(reason) = skip_reason(ctx, entity) {
        tracing::debug!(local_id = %entity.id, reason, "Push candidate skipped");
        return Some(outcome(ItemStatus::Skipped).with_message(reason));
    }

    let record = NewRemoteRecord {
        display_name: entity.name.clone(),
        fields: ctx.schema.project(ctx.sync_type, &entity.fields),
    };
    let created = with_timeout(
        ctx.options.registry_timeout,
        ctx.client.create_remote_record(ctx.sync_type, &record),
    )
    .await;

    let now = now_ms();
    let failure = match created {
        Ok(remote) => match bind_created(ctx, &entity.id, &remote, now).await {
            Ok(()) => {
                let mut pushed = outcome(ItemStatus::Pushed);
                pushed.remote_key = Some(remote.remote_key);
                return Some(pushed);
            }
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    tracing::warn!(
        site_id = %ctx.site.id,
        sync_type = %ctx.sync_type,
        local_id = %entity.id,
        error = %failure,
        "Push item failed"
    );
    ctx.record_item_error(&entity.id, &failure, now).await;
    Some(outcome(ItemStatus::PushError).with_message(failure))
}

fn skip_reason(ctx: &RunContext<'_>, entity: &LocalEntity) -> Option<&'static str> {
    if !ctx.sync_type.supports_push() {
        Some("sync type is pull only")
    } else if !entity.active {
        Some("inactive")
    } else if !entity.is_regulated() {
        Some("not tracked by the registry")
    } else if entity.name.trim().is_empty() {
        Some("no name to register")
    } else {
        None
    }
}

/// Store the key the registry assigned. Re-reads the entity first so a
/// concurrent link is never overwritten.
async fn bind_created(
    ctx: &RunContext<'_>,
    local_id: &str,
    remote: &RemoteRecord,
    now: Timestamp,
) -> Result<(), SyncError> {
    let mut entity = ctx
        .store
        .entity(local_id)
        .await?
        .ok_or_else(|| EngineError::EntityNotFound(local_id.to_string()))?;

    if let Some(current) = entity.remote_key() {
        return Err(EngineError::MappingConflict {
            local_id: entity.id.clone(),
            remote_key: current.to_string(),
        }
        .into());
    }
    ctx.ensure_key_free(&remote.remote_key, Some(local_id)).await?;

    entity.bind(remote, now);
    ctx.save(&mut entity, now).await?;
    Ok(())
}
