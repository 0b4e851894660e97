//! Request handlers.
//!
//! Handlers validate and translate requests, then hand off to the
//! [`SyncService`](crate::sync::SyncService).

mod link;
mod readiness;
mod sync;

pub use link::*;
pub use readiness::*;
pub use sync::*;
