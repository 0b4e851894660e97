//! Registry client abstraction.
//!
//! The registry is the external system of record. Orchestrators never hold
//! ambient credentials: a [`RegistryConnector`] builds a client scoped to one
//! site at the start of each run and the client is dropped when the run ends.

mod http;

pub use http::HttpRegistryConnector;

use async_trait::async_trait;
use canopy_engine::{Fields, RemoteRecord, Site, SiteId, SyncType};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Registry call errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry rejected request: {0}")]
    Rejected(String),

    #[error("registry returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("registry call timed out after {0} ms")]
    Timeout(u64),

    #[error("site {0} has no registry license")]
    MissingLicense(SiteId),

    #[error("unexpected registry response: {0}")]
    Parse(String),
}

/// A record to create in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRemoteRecord {
    pub display_name: String,
    pub fields: Fields,
}

/// Registry access for one site.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List every record of a sync type.
    async fn list_remote_records(&self, sync_type: SyncType)
        -> Result<Vec<RemoteRecord>, RegistryError>;

    /// Create a record and return it as the registry now lists it.
    async fn create_remote_record(
        &self,
        sync_type: SyncType,
        record: &NewRemoteRecord,
    ) -> Result<RemoteRecord, RegistryError>;
}

/// Builds site-scoped registry clients.
pub trait RegistryConnector: Send + Sync {
    fn connect(&self, site: &Site) -> Result<Box<dyn RegistryClient>, RegistryError>;
}

/// Run a registry call under a timeout. An elapsed timeout is an error like
/// any other failed call.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RegistryError::Timeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}
