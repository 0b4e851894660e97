//! Explicit linking of a local entity to an observed registry record.
//!
//! Linking is the manual counterpart of the matcher's name binding. The
//! decision is pure: callers gather the current state, ask [`plan_link`]
//! what to do, and only write when the answer is [`LinkDecision::Bind`].

use crate::{error::Result, EntityId, Error, LocalEntity, RemoteKey, RemoteRecord, SyncStatus};
use serde::{Deserialize, Serialize};

/// Outcome of a link request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResult {
    pub local_entity_id: EntityId,
    pub remote_key: RemoteKey,
    /// False when the pair was already linked
    pub changed: bool,
    pub sync_status: SyncStatus,
}

/// What a link request should do.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkDecision {
    /// The entity already holds this mapping
    Unchanged,
    /// Bind the entity to this record
    Bind(RemoteRecord),
}

/// Decide a link request.
///
/// - `observed` is the record as seen by the latest pull of the entity's
///   site and sync type, if it was seen at all
/// - `holder` is the entity currently mapped to `remote_key`, if any
/// - `previous_still_observed` tells whether the entity's current mapping
///   (when it points elsewhere) is still present in the latest pull
pub fn plan_link(
    local: &LocalEntity,
    remote_key: &str,
    observed: Option<&RemoteRecord>,
    holder: Option<&LocalEntity>,
    previous_still_observed: bool,
) -> Result<LinkDecision> {
    if local.remote_key() == Some(remote_key) {
        return Ok(LinkDecision::Unchanged);
    }

    let Some(record) = observed else {
        return Err(Error::NotEligible(remote_key.to_string()));
    };

    if let Some(holder) = holder.filter(|h| h.id != local.id) {
        return Err(Error::AlreadyLinked {
            remote_key: remote_key.to_string(),
            local_id: holder.id.clone(),
        });
    }

    if let Some(current) = local.remote_key() {
        if previous_still_observed {
            return Err(Error::MappingConflict {
                local_id: local.id.clone(),
                remote_key: current.to_string(),
            });
        }
    }

    Ok(LinkDecision::Bind(record.clone()))
}
