//! # Product Repository
//!
//! Scan history: every confirmed record, newest first.
//!
//! ## Key Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Local Store Operations                               │
//! │                                                                         │
//! │  scan "890111"                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  find_by_barcode ── exact equality, newest row wins                    │
//! │       │                                                                 │
//! │       ├── hit  ──► shown immediately, no network                       │
//! │       └── miss ──► SearchCoordinator::resolve                          │
//! │                                                                         │
//! │  confirm ──► insert (append, never update)                             │
//! │  clear   ──► delete_all                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queries use the runtime `query_as` API with `FromRow`, so the crate
//! builds without a live `DATABASE_URL`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{Barcode, ConfirmedRecord, Money, TaxCategory, TaxClass, TaxRate};

// =============================================================================
// Stored Row
// =============================================================================

/// One row of the scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredProduct {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub barcode: String,
    pub name: String,
    pub brand: String,
    pub price_cents: i64,
    /// `None` when the record was taxed by explicit rate.
    pub tax_category: Option<TaxCategory>,
    /// Rate in effect when the scan was confirmed.
    pub tax_rate_bps: u32,
    pub scanned_at: DateTime<Utc>,
}

impl StoredProduct {
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    pub fn tax_class(&self) -> TaxClass {
        match self.tax_category {
            Some(category) => TaxClass::Category(category),
            None => TaxClass::Rate(self.tax_rate()),
        }
    }

    /// Rebuilds the domain record.
    pub fn to_record(&self) -> DbResult<ConfirmedRecord> {
        let barcode = Barcode::new(self.barcode.clone()).map_err(|e| DbError::CorruptRow {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(ConfirmedRecord {
            barcode,
            name: self.name.clone(),
            brand: self.brand.clone(),
            price: self.price(),
            tax: self.tax_class(),
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for scan history operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Finds the newest row whose barcode equals `barcode` exactly.
    ///
    /// ## Returns
    /// * `Ok(Some(StoredProduct))` - Barcode seen before
    /// * `Ok(None)` - Never confirmed on this device
    pub async fn find_by_barcode(&self, barcode: &Barcode) -> DbResult<Option<StoredProduct>> {
        debug!(barcode = %barcode, "Looking up local history");

        let product = sqlx::query_as::<_, StoredProduct>(
            r#"
            SELECT id, barcode, name, brand, price_cents,
                   tax_category, tax_rate_bps, scanned_at
            FROM scanned_products
            WHERE barcode = ?1
            ORDER BY scanned_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(barcode.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Appends a confirmed record.
    ///
    /// ## Arguments
    /// * `record` - The confirmed record
    /// * `rate` - The rate the record's tax class resolved to at confirm time
    pub async fn insert(&self, record: &ConfirmedRecord, rate: TaxRate) -> DbResult<StoredProduct> {
        let product = StoredProduct {
            id: generate_product_id(),
            barcode: record.barcode.as_str().to_string(),
            name: record.name.clone(),
            brand: record.brand.clone(),
            price_cents: record.price.cents(),
            tax_category: record.tax.category(),
            tax_rate_bps: rate.bps(),
            scanned_at: Utc::now(),
        };

        debug!(id = %product.id, barcode = %product.barcode, "Inserting scan");

        sqlx::query(
            r#"
            INSERT INTO scanned_products (
                id, barcode, name, brand, price_cents,
                tax_category, tax_rate_bps, scanned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(product.price_cents)
        .bind(product.tax_category)
        .bind(product.tax_rate_bps)
        .bind(product.scanned_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists the most recent scans, newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<StoredProduct>> {
        let products = sqlx::query_as::<_, StoredProduct>(
            r#"
            SELECT id, barcode, name, brand, price_cents,
                   tax_category, tax_rate_bps, scanned_at
            FROM scanned_products
            ORDER BY scanned_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Deletes the whole history. Returns the number of rows removed.
    pub async fn delete_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM scanned_products")
            .execute(&self.pool)
            .await?;

        debug!(rows = result.rows_affected(), "Cleared scan history");
        Ok(result.rows_affected())
    }

    /// Counts history rows (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scanned_products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new history row ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
