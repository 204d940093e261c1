//! Catalog lookup and download of the latest register export.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use ari_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::registry::SourceConfig;

/// One downloadable attachment of a catalog package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    pub url: String,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl CatalogResource {
    /// `last_modified`, or `created` for never-modified resources.
    pub fn modified_at(&self) -> Option<NaiveDateTime> {
        self.last_modified
            .as_deref()
            .or(self.created.as_deref())
            .and_then(parse_catalog_timestamp)
    }

    /// "help" as a whole word in the name or description.
    pub fn is_help_file(&self) -> bool {
        [self.name.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
            .any(|word| word.eq_ignore_ascii_case("help"))
    }

    pub fn has_format(&self, expected: &str) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.trim().eq_ignore_ascii_case(expected.trim()))
    }
}

#[derive(Debug, Deserialize)]
struct PackageEnvelope {
    success: bool,
    #[serde(default)]
    result: Option<PackageBody>,
}

#[derive(Debug, Deserialize)]
struct PackageBody {
    #[serde(default)]
    resources: Vec<CatalogResource>,
}

fn parse_catalog_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("catalog request for package `{package_id}` failed: {source}")]
    Catalog {
        package_id: String,
        #[source]
        source: FetchError,
    },
    #[error("catalog response for package `{package_id}` was not usable: {reason}")]
    Envelope { package_id: String, reason: String },
    #[error("package `{package_id}` has no {format} resource to download")]
    NoQualifyingResource { package_id: String, format: String },
    #[error("downloading {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Parse a package-metadata response into its resource list.
pub fn parse_package_envelope(package_id: &str, body: &[u8]) -> Result<Vec<CatalogResource>, AcquireError> {
    let envelope: PackageEnvelope =
        serde_json::from_slice(body).map_err(|e| AcquireError::Envelope {
            package_id: package_id.to_string(),
            reason: e.to_string(),
        })?;
    if !envelope.success {
        return Err(AcquireError::Envelope {
            package_id: package_id.to_string(),
            reason: "success flag was false".to_string(),
        });
    }
    Ok(envelope.result.map(|r| r.resources).unwrap_or_default())
}

/// Latest resource in `expected_format` that is not a help attachment.
pub fn select_latest_resource<'a>(
    resources: &'a [CatalogResource],
    expected_format: &str,
) -> Option<&'a CatalogResource> {
    resources
        .iter()
        .filter(|r| r.has_format(expected_format) && !r.is_help_file())
        .max_by_key(|r| r.modified_at())
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn package_resources(&self, package_id: &str) -> Result<Vec<CatalogResource>, AcquireError>;
    async fn download(&self, source_id: &str, url: &str) -> Result<Vec<u8>, AcquireError>;
}

/// CKAN-style `package_show` catalog over the shared fetcher.
pub struct HttpCatalog {
    http: Arc<HttpFetcher>,
    endpoint: String,
    run_id: Uuid,
}

impl HttpCatalog {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            run_id,
        }
    }

    fn package_url(&self, package_id: &str) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}id={}", self.endpoint, sep, package_id)
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn package_resources(&self, package_id: &str) -> Result<Vec<CatalogResource>, AcquireError> {
        let url = self.package_url(package_id);
        let response = self
            .http
            .fetch_bytes(self.run_id, "catalog", &url)
            .await
            .map_err(|source| AcquireError::Catalog {
                package_id: package_id.to_string(),
                source,
            })?;
        parse_package_envelope(package_id, &response.body)
    }

    async fn download(&self, source_id: &str, url: &str) -> Result<Vec<u8>, AcquireError> {
        let response = self
            .http
            .fetch_bytes(self.run_id, source_id, url)
            .await
            .map_err(|source| AcquireError::Download {
                url: url.to_string(),
                source,
            })?;
        Ok(response.body)
    }
}

/// A downloaded register file plus where it came from.
#[derive(Debug, Clone)]
pub struct AcquiredDataset {
    pub source: SourceConfig,
    pub resource: CatalogResource,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl AcquiredDataset {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn acquire(catalog: &dyn Catalog, source: &SourceConfig) -> Result<AcquiredDataset, AcquireError> {
    let resources = catalog.package_resources(&source.package_id).await?;
    let resource = select_latest_resource(&resources, &source.expected_format)
        .cloned()
        .ok_or_else(|| AcquireError::NoQualifyingResource {
            package_id: source.package_id.clone(),
            format: source.expected_format.clone(),
        })?;
    info!(
        source_id = %source.source_id,
        resource_id = %resource.id,
        last_modified = resource.last_modified.as_deref().unwrap_or("-"),
        "selected register resource"
    );
    let body = catalog.download(&source.source_id, &resource.url).await?;
    info!(source_id = %source.source_id, bytes = body.len(), "downloaded register");
    Ok(AcquiredDataset {
        source: source.clone(),
        resource,
        body,
        fetched_at: Utc::now(),
    })
}
