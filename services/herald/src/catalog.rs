//! Remote catalog of available extensions
//!
//! The catalog is advisory metadata only. Nothing fetched here is executed.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;
use crate::error::HeraldError;
use crate::io::HttpClient;

/// One entry of the remote catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub namespace: String,
}

/// Fetches the extension catalog over HTTP
pub struct CatalogClient {
    http: Arc<dyn HttpClient>,
    url: String,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(http: Arc<dyn HttpClient>, config: &CatalogConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
            timeout: config.timeout,
        }
    }

    /// Fetch and parse the catalog
    ///
    /// Every failure maps to [`HeraldError::CatalogUnavailable`].
    pub async fn fetch_catalog(&self) -> crate::Result<Vec<ExtensionDescriptor>> {
        let unavailable = |reason: String| {
            tracing::warn!("Extension catalog at {} unavailable: {}", self.url, reason);
            HeraldError::CatalogUnavailable(reason)
        };

        let response = tokio::time::timeout(self.timeout, self.http.get(&self.url))
            .await
            .map_err(|_| unavailable(format!("no response within {:?}", self.timeout)))?
            .map_err(|e| unavailable(e.to_string()))?;

        if response.status != 200 {
            return Err(unavailable(format!("status {}", response.status)));
        }

        let catalog: Vec<ExtensionDescriptor> = serde_json::from_str(&response.body)
            .map_err(|e| unavailable(format!("malformed catalog: {}", e)))?;
        tracing::debug!("Fetched {} catalog entries", catalog.len());
        Ok(catalog)
    }

    /// Look up one descriptor by name or namespace
    pub async fn find(&self, name: &str) -> crate::Result<Option<ExtensionDescriptor>> {
        let catalog = self.fetch_catalog().await?;
        Ok(find_in(&catalog, name).cloned())
    }
}

/// Case-insensitive lookup by name, then by namespace
pub fn find_in<'a>(
    catalog: &'a [ExtensionDescriptor],
    name: &str,
) -> Option<&'a ExtensionDescriptor> {
    catalog
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name))
        .or_else(|| catalog.iter().find(|d| d.namespace.eq_ignore_ascii_case(name)))
}
