//! # Scan Service
//!
//! What the counter front end talks to. Wraps the coordinator with the
//! local scan history and the cloud publish step.
//!
//! ## Scan Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  scan(barcode)                                                          │
//! │     │                                                                   │
//! │     ├── local history has it ──────────────► Known(stored)              │
//! │     │                                                                   │
//! │     └── coordinator.resolve ──┬── outcome ──► Resolved(outcome)         │
//! │                               └── busy ─────► Busy                      │
//! │                                                                         │
//! │  confirm(record)                                                        │
//! │     validate ──► insert into history ──► spawn cloud publish            │
//! │                        │                       (failure only logged)    │
//! │                        ▼                                                │
//! │                 ConfirmReceipt { stored, publish }                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use tally_core::validation::validate_record;
use tally_core::{Barcode, ConfirmedRecord, SearchOutcome, TaxBreakdown, TaxClass, TaxRate, TaxTable};
use tally_db::{Database, StoredProduct};

use crate::backup::UpcItemDbClient;
use crate::catalog::OpenFactsClient;
use crate::cloud::RestCloudStore;
use crate::config::LookupConfig;
use crate::coordinator::{SearchCoordinator, SearchObserver};
use crate::error::Result;
use crate::source::{CatalogClient, CloudStore};

/// Result of one scan.
#[derive(Debug)]
pub enum ScanResult {
    /// Already in the local history; no network call was made.
    Known(StoredProduct),
    /// Resolved by the coordinator.
    Resolved(SearchOutcome),
    /// Another search is running; the scan was dropped.
    Busy,
}

/// Returned by [`ScanService::confirm`].
#[derive(Debug)]
pub struct ConfirmReceipt {
    /// The history row just written.
    pub stored: StoredProduct,
    /// The background cloud publish. Awaiting it is optional.
    pub publish: JoinHandle<()>,
}

pub struct ScanService {
    coordinator: Arc<SearchCoordinator>,
    cloud: Arc<dyn CloudStore>,
    db: Database,
    tax: RwLock<TaxTable>,
}

impl ScanService {
    /// `cloud` should be the same store the coordinator reads from.
    pub fn new(coordinator: Arc<SearchCoordinator>, cloud: Arc<dyn CloudStore>, db: Database) -> Self {
        ScanService {
            coordinator,
            cloud,
            db,
            tax: RwLock::new(TaxTable::default()),
        }
    }

    /// Wires the HTTP clients described by `config` around `db`.
    pub fn from_config(
        config: &LookupConfig,
        db: Database,
        observer: Option<Arc<dyn SearchObserver>>,
    ) -> Result<Self> {
        let timeout = config.timeout();
        let cloud: Arc<dyn CloudStore> = Arc::new(RestCloudStore::new(&config.cloud, timeout)?);

        let catalogs = OpenFactsClient::from_urls(&config.catalogs.urls, timeout)?
            .into_iter()
            .map(|client| Arc::new(client) as Arc<dyn CatalogClient>);

        let mut builder = SearchCoordinator::builder()
            .with_cloud(cloud.clone())
            .with_catalogs(catalogs)
            .with_backup(Arc::new(UpcItemDbClient::new(config.backup.url.clone(), timeout)?))
            .with_settings(config.search_settings());
        if let Some(observer) = observer {
            builder = builder.with_observer(observer);
        }

        let coordinator = builder.build()?;
        info!(race_width = coordinator.race_width(), "Scan service ready");

        Ok(ScanService::new(Arc::new(coordinator), cloud, db))
    }

    pub fn coordinator(&self) -> &SearchCoordinator {
        &self.coordinator
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    #[instrument(skip_all, fields(barcode = %barcode))]
    pub async fn scan(&self, barcode: &Barcode) -> Result<ScanResult> {
        if let Some(stored) = self.db.products().find_by_barcode(barcode).await? {
            info!(id = %stored.id, "Barcode found in local history");
            return Ok(ScanResult::Known(stored));
        }

        Ok(match self.coordinator.resolve(barcode).await {
            Some(outcome) => ScanResult::Resolved(outcome),
            None => ScanResult::Busy,
        })
    }

    /// Validates and stores a finished record, then publishes it to the
    /// cloud in the background.
    #[instrument(skip_all, fields(barcode = %record.barcode))]
    pub async fn confirm(&self, record: ConfirmedRecord) -> Result<ConfirmReceipt> {
        validate_record(&record)?;

        let rate = self.tax_rate(record.tax);
        let stored = self.db.products().insert(&record, rate).await?;
        info!(id = %stored.id, %rate, "Record confirmed");

        let cloud = Arc::clone(&self.cloud);
        let publish = tokio::spawn(async move {
            if let Err(e) = cloud.publish(&record).await {
                warn!(barcode = %record.barcode, error = %e, "Cloud publish failed");
            }
        });

        Ok(ConfirmReceipt { stored, publish })
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Most recent scans first.
    pub async fn history(&self, limit: u32) -> Result<Vec<StoredProduct>> {
        Ok(self.db.products().list_recent(limit).await?)
    }

    /// Deletes the whole history. Returns the number of rows removed.
    pub async fn clear_history(&self) -> Result<u64> {
        let removed = self.db.products().delete_all().await?;
        info!(removed, "Scan history cleared");
        Ok(removed)
    }

    // =========================================================================
    // Tax
    // =========================================================================

    pub fn tax_rate(&self, class: TaxClass) -> TaxRate {
        self.tax.read().unwrap_or_else(|e| e.into_inner()).resolve(class)
    }

    /// Net/tax split of the record's shelf price at the current rates.
    pub fn breakdown(&self, record: &ConfirmedRecord) -> TaxBreakdown {
        let table = self.tax.read().unwrap_or_else(|e| e.into_inner());
        TaxBreakdown::for_record(record, &table)
    }

    /// Merges remotely supplied rates. Unknown ids are skipped and returned.
    pub fn update_tax_rates(&self, remote: &Map<String, Value>) -> Vec<String> {
        let skipped = self
            .tax
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .update_rates(remote);

        for id in &skipped {
            warn!(id = %id, "Skipping unknown tax category");
        }
        skipped
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
