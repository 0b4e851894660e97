//! # Canopy Engine
//!
//! A deterministic reconciliation core for cultivation compliance.
//!
//! This crate keeps a facility's local records (rooms, cultivars, batches,
//! tags and friends) aligned with the external regulatory registry that is
//! the system of record. It decides *what* has to change; the server decides
//! *when* and talks to the network and the database.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of HTTP, SQL or the registry wire format
//! - **Deterministic**: Same inputs always produce the same classification
//! - **Testable**: Pure logic, no mocks needed
//! - **Keyed**: Every remote mapping is unique per (site, sync type)
//!
//! ## Core Concepts
//!
//! ### Local entities
//!
//! Every local record participating in reconciliation is a [`LocalEntity`]:
//! - Unique ID and owning site
//! - [`SyncType`] (locations, strains, plant batches, ...)
//! - Optional [`RemoteMapping`] to a registry record
//! - Type-specific JSON fields
//! - Orphan flag, last error and a derived [`SyncStatus`]
//!
//! Typed views ([`Room`], [`Cultivar`], [`Batch`], [`Tag`]) are projected
//! from it for the places that need domain fields.
//!
//! ### Matching
//!
//! The [`Matcher`] aligns one registry listing against the local records of
//! the same site and sync type and classifies each item as created, updated,
//! matched or orphaned. It is the only place automatic linking by name
//! happens.
//!
//! ### Sync status
//!
//! [`SyncStatus`] is never set directly. It is derived from the mapping,
//! the last error and confirmation recency by [`status::derive`].
//!
//! ### Readiness
//!
//! The [`readiness`] module evaluates the go/no-go checks that gate a push.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_engine::{LocalEntity, Matcher, MatchKind, RemoteRecord, SyncSchema, SyncType};
//!
//! let schema = SyncSchema::standard();
//! let remote = vec![
//!     RemoteRecord::new("L1", "Room A"),
//!     RemoteRecord::new("L2", "Room B"),
//! ];
//! let local = vec![LocalEntity::new(
//!     "room-1",
//!     "site-1",
//!     SyncType::Locations,
//!     "Room A",
//!     Default::default(),
//!     1706745600000,
//! )];
//!
//! let result = Matcher::new(&schema, SyncType::Locations).run(&remote, &local);
//! assert_eq!(result.counts.matched, 1);
//! assert_eq!(result.counts.created, 1);
//! assert_eq!(result.items[0].kind, MatchKind::Matched);
//! ```
//!
//! ## Persistence
//!
//! [`Store`] is an in-memory local record store that enforces the
//! at-most-one-mapping invariant. The server mirrors the same rules in
//! PostgreSQL with a partial unique index.

pub mod entity;
pub mod error;
pub mod link;
pub mod matcher;
pub mod readiness;
pub mod schema;
pub mod status;
pub mod store;
pub mod sync_log;
pub mod sync_result;

// Re-export main types at crate root
pub use entity::{
    Batch, BatchDomain, ComplianceStatus, Cultivar, LocalEntity, RemoteBatch, RemoteMapping,
    RemoteRecord, Room, Site, SyncType, Tag, TagStatus,
};
pub use error::Error;
pub use link::{plan_link, LinkDecision, LinkResult};
pub use matcher::{MatchCounts, MatchItem, MatchKind, MatchResult, Matcher};
pub use readiness::{CheckCategory, CheckCounts, CheckStatus, ReadinessCheck, ReadinessReport};
pub use schema::{FieldDef, FieldType, SyncSchema, TypeSchema};
pub use status::{StalenessPolicy, StatusInputs, SyncStatus, SyncSummary};
pub use store::Store;
pub use sync_log::{Direction, RunStatus, SyncLogEntry, SyncLogQuery};
pub use sync_result::{ItemOutcome, ItemStatus, SyncCounts, SyncResult};

/// Type aliases for clarity
pub type EntityId = String;
pub type SiteId = String;
pub type RemoteKey = String;
pub type Timestamp = u64;

/// Type-specific fields of a local or remote record.
pub type Fields = serde_json::Map<String, serde_json::Value>;
