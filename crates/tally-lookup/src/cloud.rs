//! # Crowdsourced Cloud Store
//!
//! A JSON document store holding one document per barcode. Every confirmed
//! record is published here so the next scanner of the same barcode gets a
//! complete record without racing the public catalogs.
//!
//! ## Document Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {base}/{collection}/{barcode}                                          │
//! │                                                                         │
//! │  {                                                                      │
//! │    "name":         "Widget",        required                            │
//! │    "brand":        "BrandX",        optional, "Generic" when missing    │
//! │    "price":        49.99,           required, never negative            │
//! │    "tax_category": "standard",      required unless tax_rate_bps set    │
//! │    "tax_rate_bps": 1800,            explicit rate (no category)         │
//! │    "uploaded_at":  "2026-..."       written on publish                  │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Publish
//! `PATCH` with merge semantics. Blank fields are left out of the body so a
//! later publish never overwrites stored data with empty values. The tax
//! fields are the exception: the one not in use is sent as `null` so only
//! one of them survives the merge. Transient
//! failures (network, 429, 5xx) are retried with exponential backoff until
//! the publish deadline.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use tally_core::{Barcode, ConfirmedRecord, TaxCategory, TaxClass, TaxRate, DEFAULT_BRAND};

use crate::config::CloudSettings;
use crate::error::{LookupError, Result};
use crate::http::{build_http_client, endpoint, money_from_json, status_error};
use crate::source::{CloudLookup, CloudStore};

const SOURCE_NAME: &str = "cloud";

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct CloudDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price: Option<Number>,
    // Always sent: the unused one goes out as null so a merge clears it.
    #[serde(default)]
    tax_category: Option<String>,
    #[serde(default)]
    tax_rate_bps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uploaded_at: Option<String>,
}

impl CloudDocument {
    /// Builds the merge body for `record`, leaving out blank text fields.
    /// Both tax fields are present so a rate replaces an older category
    /// and the other way round.
    fn for_publish(record: &ConfirmedRecord, uploaded_at: String) -> Result<Self> {
        let price = record
            .price
            .to_string()
            .parse::<Number>()
            .map_err(|e| LookupError::Internal(format!("price {}: {}", record.price, e)))?;

        let (tax_category, tax_rate_bps) = match record.tax {
            TaxClass::Category(category) => (Some(category.id().to_string()), None),
            TaxClass::Rate(rate) => (None, Some(rate.bps())),
        };

        Ok(CloudDocument {
            name: non_blank(&record.name),
            brand: non_blank(&record.brand),
            price: Some(price),
            tax_category,
            tax_rate_bps,
            uploaded_at: Some(uploaded_at),
        })
    }

    /// A complete record, or the name of the first field that is missing
    /// or invalid.
    fn into_record(self, barcode: &Barcode) -> std::result::Result<ConfirmedRecord, &'static str> {
        let name = self.name.filter(|n| !n.trim().is_empty()).ok_or("name")?;
        let price = self.price.as_ref().and_then(money_from_json).ok_or("price")?;

        let tax = match (self.tax_category.as_deref(), self.tax_rate_bps) {
            (Some(id), _) => TaxClass::Category(id.parse::<TaxCategory>().map_err(|_| "tax_category")?),
            (None, Some(bps)) => TaxClass::Rate(TaxRate::from_bps(bps)),
            (None, None) => return Err("tax_category"),
        };

        let brand = self
            .brand
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRAND.to_string());

        Ok(ConfirmedRecord {
            barcode: barcode.clone(),
            name,
            brand,
            price,
            tax,
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// =============================================================================
// REST Cloud Store
// =============================================================================

/// [`CloudStore`] backed by a JSON document API.
#[derive(Debug, Clone)]
pub struct RestCloudStore {
    base_url: String,
    collection: String,
    http: reqwest::Client,
    initial_backoff: Duration,
    publish_deadline: Duration,
}

impl RestCloudStore {
    pub fn new(settings: &CloudSettings, timeout: Duration) -> Result<Self> {
        Ok(RestCloudStore {
            base_url: settings.url.clone(),
            collection: settings.collection.clone(),
            http: build_http_client(timeout)?,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            publish_deadline: Duration::from_secs(settings.publish_deadline_secs),
        })
    }

    fn document_url(&self, barcode: &Barcode) -> Result<url::Url> {
        endpoint(&self.base_url, &[self.collection.as_str(), barcode.as_str()])
    }

    async fn fetch(&self, barcode: &Barcode) -> Result<Option<CloudDocument>> {
        let response = self.http.get(self.document_url(barcode)?).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(SOURCE_NAME, status));
        }

        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn try_publish(&self, record: &ConfirmedRecord) -> Result<()> {
        let document = CloudDocument::for_publish(record, chrono::Utc::now().to_rfc3339())?;

        let response = self
            .http
            .patch(self.document_url(&record.barcode)?)
            .json(&document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(SOURCE_NAME, status));
        }
        Ok(())
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(self.publish_deadline),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CloudStore for RestCloudStore {
    #[instrument(skip_all, fields(barcode = %barcode))]
    async fn lookup(&self, barcode: &Barcode) -> CloudLookup {
        let document = match self.fetch(barcode).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("No cloud document");
                return CloudLookup::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "Cloud lookup failed, treating as miss");
                return CloudLookup::NotFound;
            }
        };

        match document.into_record(barcode) {
            Ok(record) => CloudLookup::Found(record),
            Err(field) => {
                warn!(field, "Incomplete cloud document, treating as miss");
                CloudLookup::NotFound
            }
        }
    }

    #[instrument(skip_all, fields(barcode = %record.barcode))]
    async fn publish(&self, record: &ConfirmedRecord) -> Result<()> {
        let mut backoff = self.create_backoff();
        let mut attempt = 1u32;

        loop {
            match self.try_publish(record).await {
                Ok(()) => {
                    info!(attempt, "Record published to cloud");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => match backoff.next_backoff() {
                    Some(wait) => {
                        debug!(error = %e, ?wait, attempt, "Publish failed, retrying");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(error = %e, attempt, "Publish deadline exceeded");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{barcode, confirmed, CannedServer};
    use tally_core::Money;

    fn store(url: &str) -> RestCloudStore {
        let settings = CloudSettings {
            url: url.to_string(),
            initial_backoff_ms: 10,
            publish_deadline_secs: 5,
            ..CloudSettings::default()
        };
        RestCloudStore::new(&settings, Duration::from_secs(5)).unwrap()
    }

    fn document(json: &str) -> CloudDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_complete_document() {
        let record = document(r#"{"name":"Rice 5kg","price":12.5,"tax_category":"essential"}"#)
            .into_record(&barcode("890111"))
            .unwrap();

        assert_eq!(record.name, "Rice 5kg");
        assert_eq!(record.brand, "Generic");
        assert_eq!(record.price, Money::from_cents(1250));
        assert_eq!(record.tax, TaxClass::Category(TaxCategory::Essential));
    }

    #[test]
    fn test_explicit_rate_document() {
        let record = document(r#"{"name":"Fee","brand":"Acme","price":3,"tax_rate_bps":825}"#)
            .into_record(&barcode("1"))
            .unwrap();
        assert_eq!(record.tax, TaxClass::Rate(TaxRate::from_bps(825)));
        assert_eq!(record.brand, "Acme");
    }

    #[test]
    fn test_incomplete_documents() {
        let bc = barcode("1");
        assert_eq!(
            document(r#"{"price":1,"tax_category":"standard"}"#).into_record(&bc).unwrap_err(),
            "name"
        );
        assert_eq!(
            document(r#"{"name":"A","tax_category":"standard"}"#).into_record(&bc).unwrap_err(),
            "price"
        );
        assert_eq!(
            document(r#"{"name":"A","price":-1,"tax_category":"standard"}"#)
                .into_record(&bc)
                .unwrap_err(),
            "price"
        );
        assert_eq!(
            document(r#"{"name":"A","price":1,"tax_category":"Luxury"}"#)
                .into_record(&bc)
                .unwrap_err(),
            "tax_category"
        );
        assert_eq!(
            document(r#"{"name":"A","price":1}"#).into_record(&bc).unwrap_err(),
            "tax_category"
        );
    }

    #[test]
    fn test_publish_body_skips_blank_fields() {
        let mut record = confirmed("500123", "Widget");
        record.brand = "  ".to_string();

        let doc = CloudDocument::for_publish(&record, "2026-10-19T00:00:00Z".into()).unwrap();
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["name"], "Widget");
        assert_eq!(json["price"].as_f64(), Some(49.99));
        assert_eq!(json["tax_category"], "standard");
        assert!(json.get("brand").is_none());
        assert!(json["tax_rate_bps"].is_null());
        assert_eq!(json["uploaded_at"], "2026-10-19T00:00:00Z");
    }

    /// Shallow PATCH merge as the document store applies it.
    fn merge(stored: &mut serde_json::Value, patch: &CloudDocument) {
        let patch = serde_json::to_value(patch).unwrap();
        let target = stored.as_object_mut().unwrap();
        for (key, value) in patch.as_object().unwrap() {
            target.insert(key.clone(), value.clone());
        }
    }

    #[test]
    fn test_rate_publish_replaces_earlier_category() {
        let bc = barcode("500123");
        let mut record = confirmed("500123", "Widget");
        let mut stored = serde_json::json!({});

        merge(&mut stored, &CloudDocument::for_publish(&record, "t1".into()).unwrap());
        record.tax = TaxClass::Rate(TaxRate::from_bps(1200));
        merge(&mut stored, &CloudDocument::for_publish(&record, "t2".into()).unwrap());

        let read_back = serde_json::from_value::<CloudDocument>(stored.clone())
            .unwrap()
            .into_record(&bc)
            .unwrap();
        assert_eq!(read_back.tax, TaxClass::Rate(TaxRate::from_bps(1200)));

        record.tax = TaxClass::Category(TaxCategory::Luxury);
        merge(&mut stored, &CloudDocument::for_publish(&record, "t3".into()).unwrap());

        let read_back = serde_json::from_value::<CloudDocument>(stored)
            .unwrap()
            .into_record(&bc)
            .unwrap();
        assert_eq!(read_back.tax, TaxClass::Category(TaxCategory::Luxury));
    }

    #[tokio::test]
    async fn test_lookup_hit() {
        let server = CannedServer::start(vec![(
            200,
            r#"{"name":"Rice 5kg","brand":"Farm","price":12.5,"tax_category":"essential"}"#,
        )])
        .await;

        let result = store(&server.url).lookup(&barcode("890111")).await;

        assert!(matches!(result, CloudLookup::Found(r) if r.name == "Rice 5kg"));
        assert_eq!(server.requests()[0].path, "/crowdsourced_products/890111");
    }

    #[tokio::test]
    async fn test_lookup_failures_are_misses() {
        let server =
            CannedServer::start(vec![(404, "{}"), (500, "oops"), (200, "not json")]).await;
        let store = store(&server.url);

        for _ in 0..3 {
            assert_eq!(store.lookup(&barcode("1")).await, CloudLookup::NotFound);
        }
    }

    #[tokio::test]
    async fn test_publish_retries_transient_failures() {
        let server = CannedServer::start(vec![(503, "{}"), (200, "{}")]).await;

        store(&server.url)
            .publish(&confirmed("500123", "Widget"))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, "PATCH");
        assert_eq!(requests[1].path, "/crowdsourced_products/500123");
        assert!(requests[1].body.contains("\"tax_category\":\"standard\""));
    }

    #[tokio::test]
    async fn test_publish_does_not_retry_client_errors() {
        let server = CannedServer::start(vec![(403, "{}"), (200, "{}")]).await;

        let err = store(&server.url)
            .publish(&confirmed("500123", "Widget"))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::HttpStatus { status: 403, .. }));
        assert_eq!(server.requests().len(), 1);
    }
}
