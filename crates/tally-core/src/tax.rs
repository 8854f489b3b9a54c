//! # Tax Module
//!
//! Category rate table and tax-inclusive breakdowns.
//!
//! ## Rate Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  id          default   used for                                         │
//! │  ──────────  ───────   ─────────────────────────────────                │
//! │  exempt        0%      fresh produce, books                             │
//! │  essential     5%      packaged staples (also the fallback)             │
//! │  standard     18%      most goods                                       │
//! │  luxury       40%      luxury and sin goods                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table can be refreshed from a remote JSON map of `id → percent`.
//! Unknown ids are skipped and handed back to the caller for logging.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::money::Money;
use crate::types::{ConfirmedRecord, TaxCategory, TaxClass, TaxRate};

/// Category used when a record names no category or an unknown one.
pub const FALLBACK_CATEGORY: TaxCategory = TaxCategory::Essential;

// =============================================================================
// Tax Table
// =============================================================================

/// Current rate for every [`TaxCategory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxTable {
    rates: HashMap<TaxCategory, TaxRate>,
}

impl Default for TaxTable {
    fn default() -> Self {
        let rates = TaxCategory::ALL
            .into_iter()
            .map(|category| (category, category.default_rate()))
            .collect();
        Self { rates }
    }
}

impl TaxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate for a category.
    pub fn rate(&self, category: TaxCategory) -> TaxRate {
        self.rates
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_rate())
    }

    /// Rate for a category id, falling back to the essential rate.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::tax::TaxTable;
    ///
    /// let table = TaxTable::default();
    /// assert_eq!(table.rate_for(Some("luxury")).bps(), 4000);
    /// assert_eq!(table.rate_for(Some("gold")).bps(), 500);
    /// assert_eq!(table.rate_for(None).bps(), 500);
    /// ```
    pub fn rate_for(&self, id: Option<&str>) -> TaxRate {
        let category = id
            .and_then(|id| id.parse::<TaxCategory>().ok())
            .unwrap_or(FALLBACK_CATEGORY);
        self.rate(category)
    }

    /// Effective rate of a tax class.
    pub fn resolve(&self, class: TaxClass) -> TaxRate {
        match class {
            TaxClass::Category(category) => self.rate(category),
            TaxClass::Rate(rate) => rate,
        }
    }

    /// Merges remotely supplied rates.
    ///
    /// Values are percentages as JSON numbers, integer or float
    /// (`{"standard": 18, "luxury": 28.0}`). Returns the keys that were
    /// skipped because the id is unknown or the value is not a number.
    pub fn update_rates(&mut self, remote: &Map<String, Value>) -> Vec<String> {
        let mut skipped = Vec::new();

        for (id, value) in remote {
            let category = id.parse::<TaxCategory>().ok();
            let pct = value.as_f64();

            match (category, pct) {
                (Some(category), Some(pct)) => {
                    self.rates.insert(category, TaxRate::from_percentage(pct));
                }
                _ => skipped.push(id.clone()),
            }
        }

        skipped
    }
}

// =============================================================================
// Tax Breakdown
// =============================================================================

/// Split of a tax-inclusive shelf price into net amount and tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub gross: Money,
    pub tax: Money,
    pub net: Money,
    pub rate: TaxRate,
}

impl TaxBreakdown {
    /// Breaks down a gross price at the given rate.
    pub fn of(gross: Money, rate: TaxRate) -> Self {
        let tax = gross.included_tax(rate);
        Self {
            gross,
            tax,
            net: gross - tax,
            rate,
        }
    }

    /// Breaks down a confirmed record using the table's current rates.
    pub fn for_record(record: &ConfirmedRecord, table: &TaxTable) -> Self {
        Self::of(record.price, table.resolve(record.tax))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
