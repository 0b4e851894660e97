//! Append-only audit record of orchestrator runs.

use crate::sync_result::{SyncCounts, SyncResult};
use crate::{SiteId, SyncType, Timestamp};
use serde::{Deserialize, Serialize};

/// Which way a run moved data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Pull,
    Push,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Pull => write!(f, "pull"),
            Direction::Push => write!(f, "push"),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Partial,
    InProgress,
}

/// One row of the sync log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: String,
    pub site_id: SiteId,
    pub sync_type: SyncType,
    pub direction: Direction,
    pub status: RunStatus,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub counts: SyncCounts,
}

impl SyncLogEntry {
    /// Summarize a run that reached the item stage.
    pub fn from_result(
        id: impl Into<String>,
        result: &SyncResult,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        let error_message = if result.errors.is_empty() {
            None
        } else {
            Some(result.errors.join("; "))
        };

        Self {
            id: id.into(),
            site_id: result.site_id.clone(),
            sync_type: result.sync_type,
            direction: result.direction,
            status: result.run_status(),
            started_at,
            finished_at: Some(finished_at),
            error_message,
            counts: result.counts,
        }
    }

    /// Record a run that aborted before any item was processed.
    pub fn failed(
        id: impl Into<String>,
        site_id: impl Into<SiteId>,
        sync_type: SyncType,
        direction: Direction,
        started_at: Timestamp,
        finished_at: Timestamp,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            site_id: site_id.into(),
            sync_type,
            direction,
            status: RunStatus::Failed,
            started_at,
            finished_at: Some(finished_at),
            error_message: Some(message.into()),
            counts: SyncCounts::default(),
        }
    }
}

/// Filter over the sync log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogQuery {
    pub site_id: SiteId,
    pub sync_type: Option<SyncType>,
    /// Inclusive lower bound on `started_at`
    pub from: Option<Timestamp>,
    /// Inclusive upper bound on `started_at`
    pub to: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl SyncLogQuery {
    pub fn for_site(site_id: impl Into<SiteId>) -> Self {
        Self {
            site_id: site_id.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &SyncLogEntry) -> bool {
        entry.site_id == self.site_id
            && self.sync_type.is_none_or(|t| t == entry.sync_type)
            && self.from.is_none_or(|from| entry.started_at >= from)
            && self.to.is_none_or(|to| entry.started_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_result::{ItemOutcome, ItemStatus};

    #[test]
    fn from_completed_result() {
        let mut result = SyncResult::new("site-1", SyncType::Strains, Direction::Pull);
        result.record(ItemOutcome::new(
            ItemStatus::Created,
            "Blue Dream",
            Some("cultivar-1".into()),
            Some("S1".into()),
        ));

        let entry = SyncLogEntry::from_result("log-1", &result, 1000, 1500);
        assert_eq!(entry.status, RunStatus::Completed);
        assert_eq!(entry.counts.created, 1);
        assert_eq!(entry.error_message, None);
        assert_eq!(entry.finished_at, Some(1500));
    }

    #[test]
    fn from_partial_result_joins_errors() {
        let mut result = SyncResult::new("site-1", SyncType::Strains, Direction::Pull);
        result.record(
            ItemOutcome::new(ItemStatus::Failed, "A", None, Some("S1".into())).with_message("x"),
        );
        result.record(
            ItemOutcome::new(ItemStatus::Failed, "B", None, Some("S2".into())).with_message("y"),
        );

        let entry = SyncLogEntry::from_result("log-1", &result, 1000, 1500);
        assert_eq!(entry.status, RunStatus::Partial);
        assert_eq!(entry.error_message.as_deref(), Some("A: x; B: y"));
    }

    #[test]
    fn failed_entry_has_zero_progress() {
        let entry = SyncLogEntry::failed(
            "log-1",
            "site-1",
            SyncType::Locations,
            Direction::Pull,
            1000,
            1200,
            "registry unavailable: connection refused",
        );
        assert_eq!(entry.status, RunStatus::Failed);
        assert_eq!(entry.counts, SyncCounts::default());
    }

    #[test]
    fn query_filters() {
        let entry = SyncLogEntry::failed(
            "log-1",
            "site-1",
            SyncType::Locations,
            Direction::Pull,
            1000,
            1200,
            "boom",
        );

        assert!(SyncLogQuery::for_site("site-1").matches(&entry));
        assert!(!SyncLogQuery::for_site("site-2").matches(&entry));

        let by_type = SyncLogQuery {
            sync_type: Some(SyncType::Strains),
            ..SyncLogQuery::for_site("site-1")
        };
        assert!(!by_type.matches(&entry));

        let in_range = SyncLogQuery {
            from: Some(1000),
            to: Some(1000),
            ..SyncLogQuery::for_site("site-1")
        };
        assert!(in_range.matches(&entry));

        let after = SyncLogQuery {
            from: Some(1001),
            ..SyncLogQuery::for_site("site-1")
        };
        assert!(!after.matches(&entry));
    }

    #[test]
    fn direction_serialization() {
        assert_eq!(serde_json::to_string(&Direction::Pull).unwrap(), r#""pull""#);
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            r#""in_progress""#
        );
    }
}
