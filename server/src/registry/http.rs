//! HTTP registry client over `reqwest`.
//!
//! Records live under `{base}/licenses/{license}/{sync_type}`: `GET` lists
//! them and `POST` creates one.

use super::{NewRemoteRecord, RegistryClient, RegistryConnector, RegistryError};
use crate::config::RegistryConfig;
use async_trait::async_trait;
use canopy_engine::{RemoteRecord, Site, SyncType};
use reqwest::Url;

/// Builds [`HttpRegistryClient`]s sharing one connection pool.
pub struct HttpRegistryConnector {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpRegistryConnector {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RegistryError::Parse(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Parse(format!(
                "invalid base url: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("canopy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }
}

impl RegistryConnector for HttpRegistryConnector {
    fn connect(&self, site: &Site) -> Result<Box<dyn RegistryClient>, RegistryError> {
        let license = site
            .license_number
            .clone()
            .ok_or_else(|| RegistryError::MissingLicense(site.id.clone()))?;

        Ok(Box::new(HttpRegistryClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            license,
            api_key: self.api_key.clone(),
        }))
    }
}

/// Registry client scoped to one license.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: Url,
    license: String,
    api_key: Option<String>,
}

impl HttpRegistryClient {
    fn endpoint(&self, sync_type: SyncType) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Parse("base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["licenses", self.license.as_str(), sync_type.as_str()]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_remote_records(
        &self,
        sync_type: SyncType,
    ) -> Result<Vec<RemoteRecord>, RegistryError> {
        let url = self.endpoint(sync_type)?;
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = check_response(resp).await?;
        resp.json::<Vec<RemoteRecord>>()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))
    }

    async fn create_remote_record(
        &self,
        sync_type: SyncType,
        record: &NewRemoteRecord,
    ) -> Result<RemoteRecord, RegistryError> {
        let url = self.endpoint(sync_type)?;
        let resp = self.authorize(self.http.post(url)).json(record).send().await?;

        if resp.status().is_client_error() {
            let reason = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected(if reason.is_empty() {
                "request refused".to_string()
            } else {
                reason
            }));
        }

        let resp = check_response(resp).await?;
        resp.json::<RemoteRecord>()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))
    }
}

/// Map a non-success status to [`RegistryError::Api`].
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    if !resp.status().is_success() {
        return Err(RegistryError::Api {
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}
