//! # UPCitemdb Backup Client
//!
//! Consulted once, after every catalog in the race has missed.
//!
//! ```text
//! GET {base}/prod/trial/lookup?upc={barcode}
//!
//! { "total": 1, "items": [ { "title", "brand", "lowest_recorded_price" } ] }
//!   total > 0 → Found(items[0])      total == 0 / no items → NotFound
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Number;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use tally_core::validation::best_name;
use tally_core::{Barcode, CandidateRecord};

use crate::error::{LookupError, Result};
use crate::http::{build_http_client, endpoint, money_from_json, status_error};
use crate::source::{BackupCatalogClient, LookupResult};

const SOURCE_NAME: &str = "upcitemdb";

#[derive(Debug, Deserialize)]
struct UpcResponse {
    #[serde(default)]
    total: i64,
    #[serde(default)]
    items: Vec<UpcItem>,
}

#[derive(Debug, Deserialize)]
struct UpcItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    lowest_recorded_price: Option<Number>,
}

impl UpcResponse {
    fn into_candidate(self) -> Option<CandidateRecord> {
        if self.total <= 0 {
            return None;
        }
        let item = self.items.into_iter().next()?;

        let mut candidate = CandidateRecord::new(
            best_name(item.title.as_deref(), None),
            item.brand.unwrap_or_default(),
        );
        // Only a positive recorded price is worth pre-filling.
        if let Some(price) = item
            .lowest_recorded_price
            .as_ref()
            .and_then(money_from_json)
            .filter(|p| !p.is_zero())
        {
            candidate = candidate.with_price(price);
        }
        Some(candidate)
    }
}

pub(crate) fn parse_upc(body: &str) -> Result<Option<CandidateRecord>> {
    let response: UpcResponse = serde_json::from_str(body)?;
    Ok(response.into_candidate())
}

/// Reads the UPCitemdb trial API.
#[derive(Debug, Clone)]
pub struct UpcItemDbClient {
    base_url: String,
    http: reqwest::Client,
}

impl UpcItemDbClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(UpcItemDbClient {
            base_url: base_url.into(),
            http: build_http_client(timeout)?,
        })
    }

    async fn fetch(&self, barcode: &Barcode) -> Result<Option<CandidateRecord>> {
        let mut url = endpoint(&self.base_url, &["prod", "trial", "lookup"])?;
        url.query_pairs_mut().append_pair("upc", barcode.as_str());

        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(SOURCE_NAME, status));
        }

        let body = response.text().await?;
        parse_upc(&body)
    }
}

#[async_trait]
impl BackupCatalogClient for UpcItemDbClient {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip_all, fields(barcode = %barcode))]
    async fn lookup(&self, barcode: &Barcode, cancel: &CancellationToken) -> LookupResult {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LookupResult::Error(LookupError::Cancelled),
            result = self.fetch(barcode) => result,
        };

        let result = LookupResult::from(result);
        debug!(result = result.label(), "Backup answered");
        result
    }
}
