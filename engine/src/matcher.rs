//! Matching of registry listings against local records.
//!
//! This is the core of reconciliation. Given one registry listing and the
//! local records of the same site and sync type, it decides what each item
//! needs without touching any state.
//!
//! # Algorithm
//!
//! 1. Partition local records into mapped and unmapped
//! 2. Match remote records to mapped locals by remote key
//!    (`updated` if a tracked field differs, else `matched`)
//! 3. Match the rest case-insensitively by name against unmapped locals
//!    (`matched`, and the local gets bound) or classify as `created`
//! 4. Mapped locals whose key is absent from the listing are `orphaned`

use crate::{EntityId, LocalEntity, RemoteRecord, SyncSchema, SyncType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Classification of one reconciled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// No local counterpart; a local record must be synthesized
    Created,
    /// Matched by key, tracked fields differ
    Updated,
    /// Matched by key with no changes, or bound by name
    Matched,
    /// Mapped local whose remote record is gone from the listing
    Orphaned,
}

/// One classified item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchItem {
    pub kind: MatchKind,
    /// The registry record (absent for orphans)
    pub remote: Option<RemoteRecord>,
    /// The local record (absent for creations)
    pub local_id: Option<EntityId>,
    /// The local was unmapped and gets bound to `remote`
    pub bound_by_name: bool,
}

/// Aggregate counts of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCounts {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub matched: usize,
    pub orphaned: usize,
}

/// Result of matching.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub items: Vec<MatchItem>,
    pub counts: MatchCounts,
}

impl MatchResult {
    fn push(&mut self, item: MatchItem) {
        match item.kind {
            MatchKind::Created => self.counts.created += 1,
            MatchKind::Updated => self.counts.updated += 1,
            MatchKind::Matched => self.counts.matched += 1,
            MatchKind::Orphaned => self.counts.orphaned += 1,
        }
        self.items.push(item);
    }

    /// Items of one kind.
    pub fn of_kind(&self, kind: MatchKind) -> impl Iterator<Item = &MatchItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }
}

/// Aligns a registry listing with local records of one sync type.
pub struct Matcher<'a> {
    schema: &'a SyncSchema,
    sync_type: SyncType,
}

impl<'a> Matcher<'a> {
    pub fn new(schema: &'a SyncSchema, sync_type: SyncType) -> Self {
        Self { schema, sync_type }
    }

    /// Classify every remote and local record.
    ///
    /// Items come out in listing order followed by orphans in local order.
    /// A remote key listed twice is only considered once.
    pub fn run(&self, remote: &[RemoteRecord], local: &[LocalEntity]) -> MatchResult {
        let mut result = MatchResult::default();

        let mut mapped: HashMap<&str, &LocalEntity> = HashMap::new();
        let mut unmapped: Vec<&LocalEntity> = Vec::new();
        for entity in local {
            match entity.remote_key() {
                Some(key) => {
                    mapped.entry(key).or_insert(entity);
                }
                None => unmapped.push(entity),
            }
        }

        let mut seen_keys: HashSet<&str> = HashSet::new();
        let mut claimed: HashSet<&str> = HashSet::new();

        for record in remote {
            if !seen_keys.insert(record.remote_key.as_str()) {
                continue;
            }
            result.counts.found += 1;

            if let Some(entity) = mapped.get(record.remote_key.as_str()) {
                let kind = if self.schema.differs(self.sync_type, record, entity) {
                    MatchKind::Updated
                } else {
                    MatchKind::Matched
                };
                result.push(MatchItem {
                    kind,
                    remote: Some(record.clone()),
                    local_id: Some(entity.id.clone()),
                    bound_by_name: false,
                });
                continue;
            }

            let wanted = record.display_name.to_lowercase();
            let by_name = unmapped
                .iter()
                .copied()
                .find(|e| !claimed.contains(e.id.as_str()) && e.name.to_lowercase() == wanted);

            match by_name {
                Some(entity) => {
                    claimed.insert(entity.id.as_str());
                    result.push(MatchItem {
                        kind: MatchKind::Matched,
                        remote: Some(record.clone()),
                        local_id: Some(entity.id.clone()),
                        bound_by_name: true,
                    });
                }
                None => result.push(MatchItem {
                    kind: MatchKind::Created,
                    remote: Some(record.clone()),
                    local_id: None,
                    bound_by_name: false,
                }),
            }
        }

        for entity in local {
            let Some(key) = entity.remote_key() else {
                continue;
            };
            // only the first holder of a key is considered
            let is_holder = mapped.get(key).is_some_and(|held| held.id == entity.id);
            if is_holder && !seen_keys.contains(key) {
                result.push(MatchItem {
                    kind: MatchKind::Orphaned,
                    remote: None,
                    local_id: Some(entity.id.clone()),
                    bound_by_name: false,
                });
            }
        }

        result
    }
}
