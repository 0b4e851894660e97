//! In-flight run tracking.
//!
//! At most one run (pull or push) may be active per (site, sync type). A
//! second request for the same key is rejected while the first holds its
//! [`RunGuard`]; dropping the guard frees the key.

use canopy_engine::{Direction, SiteId, SyncType, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type RunKey = (SiteId, SyncType);

#[derive(Debug)]
struct ActiveRun {
    direction: Direction,
    started_at: Timestamp,
    cancel: CancelFlag,
}

/// Tracks active runs.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<RunKey, ActiveRun>,
}

impl RunRegistry {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the key for a new run. Returns `None` if a run already holds it.
    pub fn try_begin(
        self: &Arc<Self>,
        site_id: &str,
        sync_type: SyncType,
        direction: Direction,
        started_at: Timestamp,
    ) -> Option<RunGuard> {
        let key = (site_id.to_string(), sync_type);
        match self.runs.entry(key.clone()) {
            Entry::Occupied(active) => {
                tracing::debug!(
                    site_id,
                    %sync_type,
                    active_direction = %active.get().direction,
                    active_since = active.get().started_at,
                    "Rejected concurrent sync run"
                );
                None
            }
            Entry::Vacant(slot) => {
                let cancel = CancelFlag::default();
                slot.insert(ActiveRun {
                    direction,
                    started_at,
                    cancel: cancel.clone(),
                });
                Some(RunGuard {
                    registry: Arc::clone(self),
                    key,
                    cancel,
                })
            }
        }
    }

    /// Request cancellation of the active run for a key.
    ///
    /// Returns false when nothing is running.
    pub fn cancel(&self, site_id: &str, sync_type: SyncType) -> bool {
        match self.runs.get(&(site_id.to_string(), sync_type)) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, site_id: &str, sync_type: SyncType) -> bool {
        self.runs.contains_key(&(site_id.to_string(), sync_type))
    }
}

/// Holds a run key until dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    key: RunKey,
    cancel: CancelFlag,
}

impl RunGuard {
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.runs.remove(&self.key);
    }
}
