//! Sync status derivation.
//!
//! Status is a pure function of an entity's mapping, error and confirmation
//! state. Nothing sets it directly; stores call
//! [`LocalEntity::refresh_status`](crate::LocalEntity::refresh_status) on
//! every write and readers recompute it so staleness decay shows up without
//! a write.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry sync state of a local entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No remote mapping
    NotSynced,
    /// Mapped but never confirmed by a successful run
    Pending,
    Synced,
    /// Last operation on this entity failed
    Error,
    /// Orphaned, or confirmation is older than the staleness window
    OutOfSync,
    /// Entity does not participate in registry compliance
    NotRequired,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NotSynced => "not_synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
            SyncStatus::OutOfSync => "out_of_sync",
            SyncStatus::NotRequired => "not_required",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_synced" => Ok(SyncStatus::NotSynced),
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "error" => Ok(SyncStatus::Error),
            "out_of_sync" => Ok(SyncStatus::OutOfSync),
            "not_required" => Ok(SyncStatus::NotRequired),
            other => Err(crate::Error::InvalidPayload(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// How long a confirmation stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessPolicy {
    pub stale_after_ms: u64,
}

impl StalenessPolicy {
    pub const DEFAULT_STALE_AFTER_MS: u64 = 24 * 60 * 60 * 1000;

    pub fn new(stale_after_ms: u64) -> Self {
        Self { stale_after_ms }
    }

    /// A never-confirmed entity is always stale.
    pub fn is_stale(&self, last_synced_at: Option<Timestamp>, now: Timestamp) -> bool {
        match last_synced_at {
            Some(at) => now.saturating_sub(at) > self.stale_after_ms,
            None => true,
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STALE_AFTER_MS)
    }
}

/// Everything status derivation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInputs {
    pub regulated: bool,
    pub mapped: bool,
    pub confirmed: bool,
    pub orphaned: bool,
    pub has_error: bool,
    pub last_synced_at: Option<Timestamp>,
}

/// Derive the sync status.
///
/// Precedence: not regulated, error, unmapped, unconfirmed, orphaned or
/// stale, synced.
pub fn derive(inputs: &StatusInputs, policy: &StalenessPolicy, now: Timestamp) -> SyncStatus {
    if !inputs.regulated {
        return SyncStatus::NotRequired;
    }
    if inputs.has_error {
        return SyncStatus::Error;
    }
    if !inputs.mapped {
        return SyncStatus::NotSynced;
    }
    if !inputs.confirmed {
        return SyncStatus::Pending;
    }
    if inputs.orphaned || policy.is_stale(inputs.last_synced_at, now) {
        return SyncStatus::OutOfSync;
    }
    SyncStatus::Synced
}

/// Per-status counts over a set of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub total: usize,
    pub synced: usize,
    pub pending: usize,
    pub errors: usize,
    pub not_synced: usize,
    pub out_of_sync: usize,
    pub not_required: usize,
}

impl SyncSummary {
    pub fn from_statuses(statuses: impl IntoIterator<Item = SyncStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.total += 1;
            match status {
                SyncStatus::Synced => summary.synced += 1,
                SyncStatus::Pending => summary.pending += 1,
                SyncStatus::Error => summary.errors += 1,
                SyncStatus::NotSynced => summary.not_synced += 1,
                SyncStatus::OutOfSync => summary.out_of_sync += 1,
                SyncStatus::NotRequired => summary.not_required += 1,
            }
        }
        summary
    }
}
