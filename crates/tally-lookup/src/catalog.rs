//! # Open*Facts Catalog Client
//!
//! One [`OpenFactsClient`] per public catalog in the race. The Open Food,
//! Beauty and Products Facts databases share one read API, so the same
//! client serves all three with a different base URL.
//!
//! ## Request / Response
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET {base}/api/v0/product/{barcode}.json                               │
//! │                                                                         │
//! │  200 { "status": 1, "product": { "product_name", "brands", ... } }     │
//! │        → Found(name = product_name | product_name_en, brand = brands) │
//! │  200 { "status": 0, ... }  → NotFound                                   │
//! │  404                       → NotFound                                   │
//! │  other non-2xx / transport → Error                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use tally_core::validation::best_name;
use tally_core::{Barcode, CandidateRecord};

use crate::error::{LookupError, Result};
use crate::http::{build_http_client, endpoint, status_error};
use crate::source::{CatalogClient, LookupResult};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    product: Option<ProductData>,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    product_name_en: Option<String>,
    #[serde(default)]
    brands: Option<String>,
}

impl ProductResponse {
    fn into_candidate(self) -> Option<CandidateRecord> {
        if self.status != 1 {
            return None;
        }
        let product = self.product?;
        let name = best_name(
            product.product_name.as_deref(),
            product.product_name_en.as_deref(),
        );
        Some(CandidateRecord::new(name, product.brands.unwrap_or_default()))
    }
}

/// Decodes a catalog payload. `Ok(None)` means the catalog has no match.
pub(crate) fn parse_product(body: &str) -> Result<Option<CandidateRecord>> {
    let response: ProductResponse = serde_json::from_str(body)?;
    Ok(response.into_candidate())
}

// =============================================================================
// Client
// =============================================================================

/// Reads one Open*Facts catalog.
#[derive(Debug, Clone)]
pub struct OpenFactsClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenFactsClient {
    /// Creates a client for `base_url`; the host becomes the source name.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)?;
        let name = parsed
            .host_str()
            .ok_or_else(|| LookupError::InvalidUrl(format!("{} has no host", base_url)))?
            .to_string();

        Ok(OpenFactsClient {
            name,
            base_url,
            http: build_http_client(timeout)?,
        })
    }

    /// One client per configured URL, in configuration order.
    pub fn from_urls(urls: &[String], timeout: Duration) -> Result<Vec<Self>> {
        urls.iter()
            .map(|url| OpenFactsClient::new(url.clone(), timeout))
            .collect()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, barcode: &Barcode) -> Result<Option<CandidateRecord>> {
        let document = format!("{}.json", barcode.as_str());
        let url = endpoint(&self.base_url, &["api", "v0", "product", document.as_str()])?;

        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(&self.name, status));
        }

        let body = response.text().await?;
        parse_product(&body)
    }
}

#[async_trait]
impl CatalogClient for OpenFactsClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(source = %self.name, barcode = %barcode))]
    async fn lookup(&self, barcode: &Barcode, cancel: &CancellationToken) -> LookupResult {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LookupResult::Error(LookupError::Cancelled),
            result = self.fetch(barcode) => result,
        };

        let result = LookupResult::from(result);
        debug!(result = result.label(), "Catalog answered");
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
