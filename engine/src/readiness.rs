//! Go/no-go checks that gate a push.
//!
//! Every check is evaluated independently from data the caller gathered.
//! Deficiencies are `warning`s; `fail` is reserved for checks that could not
//! run at all, and only a `fail` blocks the composite gate.

use crate::{Batch, BatchDomain, Cultivar, LocalEntity, RemoteRecord, SyncType, Tag};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Detail lines kept per check.
const MAX_DETAILS: usize = 20;

/// The fixed battery of readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    LocationsSynced,
    StrainsSynced,
    ItemsSynced,
    TagsAvailable,
    CultivarsLinked,
    BatchesTagComplete,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 6] = [
        CheckCategory::LocationsSynced,
        CheckCategory::StrainsSynced,
        CheckCategory::ItemsSynced,
        CheckCategory::TagsAvailable,
        CheckCategory::CultivarsLinked,
        CheckCategory::BatchesTagComplete,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CheckCategory::LocationsSynced => "locations",
            CheckCategory::StrainsSynced => "strains",
            CheckCategory::ItemsSynced => "items",
            CheckCategory::TagsAvailable => "tags",
            CheckCategory::CultivarsLinked => "cultivars",
            CheckCategory::BatchesTagComplete => "batches",
        }
    }

    /// The sync type whose data the check reads.
    pub fn sync_type(&self) -> SyncType {
        match self {
            CheckCategory::LocationsSynced => SyncType::Locations,
            CheckCategory::StrainsSynced | CheckCategory::CultivarsLinked => SyncType::Strains,
            CheckCategory::ItemsSynced => SyncType::Items,
            CheckCategory::TagsAvailable => SyncType::Tags,
            CheckCategory::BatchesTagComplete => SyncType::PlantBatches,
        }
    }

    /// Whether the check compares against a live registry listing.
    pub fn reads_registry(&self) -> bool {
        matches!(
            self,
            CheckCategory::LocationsSynced
                | CheckCategory::StrainsSynced
                | CheckCategory::ItemsSynced
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCounts {
    pub total: usize,
    pub ready: usize,
    pub issues: usize,
}

/// Result of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessCheck {
    pub category: CheckCategory,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<CheckCounts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ReadinessCheck {
    fn new(category: CheckCategory, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            category,
            status,
            message: message.into(),
            counts: None,
            details: Vec::new(),
        }
    }

    pub fn pass(category: CheckCategory, message: impl Into<String>) -> Self {
        Self::new(category, CheckStatus::Pass, message)
    }

    pub fn warning(category: CheckCategory, message: impl Into<String>) -> Self {
        Self::new(category, CheckStatus::Warning, message)
    }

    pub fn fail(category: CheckCategory, message: impl Into<String>) -> Self {
        Self::new(category, CheckStatus::Fail, message)
    }

    pub fn pending(category: CheckCategory, message: impl Into<String>) -> Self {
        Self::new(category, CheckStatus::Pending, message)
    }

    pub fn with_counts(mut self, counts: CheckCounts) -> Self {
        self.counts = Some(counts);
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self.details.truncate(MAX_DETAILS);
        self
    }
}

/// Composite go/no-go signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
}

impl ReadinessReport {
    pub fn from_checks(checks: Vec<ReadinessCheck>) -> Self {
        Self {
            ready: is_ready(&checks),
            checks,
        }
    }
}

/// A push is allowed when no check failed. Warnings never block.
pub fn is_ready(checks: &[ReadinessCheck]) -> bool {
    checks.iter().all(|check| check.status != CheckStatus::Fail)
}

/// Compare a live registry listing with the local records of the same type.
///
/// Issues are registry records no local entity is linked to, active
/// regulated locals with no mapping, and orphaned locals.
pub fn evaluate_coverage(
    category: CheckCategory,
    remote: &[RemoteRecord],
    local: &[LocalEntity],
) -> ReadinessCheck {
    let label = category.label();
    if remote.is_empty() {
        return ReadinessCheck::warning(
            category,
            format!("No {label} found in the registry yet"),
        );
    }

    let linked: HashSet<&str> = local.iter().filter_map(|e| e.remote_key()).collect();
    let remote_keys: HashSet<&str> = remote.iter().map(|r| r.remote_key.as_str()).collect();

    let mut details = Vec::new();
    let mut unlinked = 0;
    let mut seen = HashSet::new();
    for record in remote {
        if !seen.insert(record.remote_key.as_str()) {
            continue;
        }
        if !linked.contains(record.remote_key.as_str()) {
            unlinked += 1;
            details.push(format!("Registry record not linked: {}", record.display_name));
        }
    }

    let mut unmapped = 0;
    let mut orphaned = 0;
    for entity in local.iter().filter(|e| e.active && e.is_regulated()) {
        match entity.remote_key() {
            None => {
                unmapped += 1;
                details.push(format!("Not in registry: {}", entity.name));
            }
            Some(key) if entity.orphaned || !remote_keys.contains(key) => {
                orphaned += 1;
                details.push(format!("Missing from registry: {}", entity.name));
            }
            Some(_) => {}
        }
    }

    let total = seen.len();
    let counts = CheckCounts {
        total,
        ready: total - unlinked,
        issues: unlinked + unmapped + orphaned,
    };

    if counts.issues == 0 {
        ReadinessCheck::pass(category, format!("All {total} {label} are linked"))
            .with_counts(counts)
    } else {
        ReadinessCheck::warning(
            category,
            format!("{} {label} need attention", counts.issues),
        )
        .with_counts(counts)
        .with_details(details)
    }
}

/// Available registry tags against a low watermark.
pub fn evaluate_tags(tags: &[Tag], low_watermark: usize) -> ReadinessCheck {
    let category = CheckCategory::TagsAvailable;
    let available = tags.iter().filter(|t| t.is_available()).count();
    let counts = CheckCounts {
        total: tags.len(),
        ready: available,
        issues: 0,
    };

    // The check ran, so an empty pool warns; only a check that cannot run fails.
    if available == 0 {
        ReadinessCheck::warning(category, "No available tags").with_counts(counts)
    } else if available < low_watermark {
        ReadinessCheck::warning(
            category,
            format!("Only {available} tags available (below {low_watermark})"),
        )
        .with_counts(counts)
    } else {
        ReadinessCheck::pass(category, format!("{available} tags available")).with_counts(counts)
    }
}

/// Every cultivar should carry a registry strain.
pub fn evaluate_cultivars_linked(cultivars: &[Cultivar]) -> ReadinessCheck {
    let category = CheckCategory::CultivarsLinked;
    let unlinked: Vec<&Cultivar> = cultivars
        .iter()
        .filter(|c| c.remote_strain_id.is_none())
        .collect();
    let counts = CheckCounts {
        total: cultivars.len(),
        ready: cultivars.len() - unlinked.len(),
        issues: unlinked.len(),
    };

    if unlinked.is_empty() {
        return ReadinessCheck::pass(category, "All cultivars are linked to a registry strain")
            .with_counts(counts);
    }

    ReadinessCheck::warning(
        category,
        format!("{} cultivars are not linked to a registry strain", unlinked.len()),
    )
    .with_counts(counts)
    .with_details(unlinked.iter().map(|c| c.name.clone()).collect())
}

/// Active cannabis batches need one tag per plant. Produce batches are not
/// tagged and are ignored.
pub fn evaluate_batch_tags(batches: &[Batch]) -> ReadinessCheck {
    let category = CheckCategory::BatchesTagComplete;
    let mut total = 0;
    let mut details = Vec::new();

    for batch in batches.iter().filter(|b| b.active) {
        match &batch.domain {
            BatchDomain::Cannabis {
                plant_count, tags, ..
            } => {
                total += 1;
                let tagged = tags.len();
                if tagged < *plant_count as usize {
                    details.push(format!(
                        "{}: {tagged} of {plant_count} plants tagged",
                        batch.name
                    ));
                }
            }
            BatchDomain::Produce { .. } => {}
        }
    }

    let counts = CheckCounts {
        total,
        ready: total - details.len(),
        issues: details.len(),
    };

    if details.is_empty() {
        ReadinessCheck::pass(category, "All batches are fully tagged").with_counts(counts)
    } else {
        ReadinessCheck::warning(
            category,
            format!("{} batches are missing tags", details.len()),
        )
        .with_counts(counts)
        .with_details(details)
    }
}
