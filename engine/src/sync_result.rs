//! Per-run result accumulation.

use crate::sync_log::{Direction, RunStatus};
use crate::{EntityId, RemoteKey, SiteId, SyncType};
use serde::{Deserialize, Serialize};

/// Outcome of one item in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Created,
    Updated,
    Matched,
    Orphaned,
    Pushed,
    PushError,
    Skipped,
    /// A pull item whose local write failed
    Failed,
}

impl ItemStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, ItemStatus::PushError | ItemStatus::Failed)
    }
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub local_id: Option<EntityId>,
    pub remote_key: Option<RemoteKey>,
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemOutcome {
    pub fn new(
        status: ItemStatus,
        name: impl Into<String>,
        local_id: Option<EntityId>,
        remote_key: Option<RemoteKey>,
    ) -> Self {
        Self {
            local_id,
            remote_key,
            name: name.into(),
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Counts accumulated over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncCounts {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub matched: usize,
    pub orphaned: usize,
    pub pushed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub site_id: SiteId,
    pub sync_type: SyncType,
    pub direction: Direction,
    pub counts: SyncCounts,
    pub items: Vec<ItemOutcome>,
    pub errors: Vec<String>,
    /// The run stopped between items on request
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn new(site_id: impl Into<SiteId>, sync_type: SyncType, direction: Direction) -> Self {
        Self {
            site_id: site_id.into(),
            sync_type,
            direction,
            counts: SyncCounts::default(),
            items: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    /// Fold one item outcome into the counts.
    pub fn record(&mut self, outcome: ItemOutcome) {
        let counts = &mut self.counts;
        match outcome.status {
            ItemStatus::Created => counts.created += 1,
            ItemStatus::Updated => counts.updated += 1,
            ItemStatus::Matched => counts.matched += 1,
            ItemStatus::Orphaned => counts.orphaned += 1,
            ItemStatus::Pushed => counts.pushed += 1,
            ItemStatus::Skipped => counts.skipped += 1,
            ItemStatus::PushError | ItemStatus::Failed => counts.failed += 1,
        }

        if outcome.status.is_error() {
            let reason = outcome.message.as_deref().unwrap_or("unknown error");
            self.errors.push(format!("{}: {}", outcome.name, reason));
        }

        self.items.push(outcome);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn finish(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Overall status of a run whose fetch succeeded.
    pub fn run_status(&self) -> RunStatus {
        if self.errors.is_empty() && !self.cancelled {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        }
    }

    pub fn outcomes(&self, status: ItemStatus) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(move |item| item.status == status)
    }
}
