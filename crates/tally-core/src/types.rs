//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Barcode      │   │ CandidateRecord │   │ ConfirmedRecord │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  raw string     │   │  name, brand    │   │  barcode        │       │
//! │  │  non-empty      │──►│  price?         │──►│  name, brand    │       │
//! │  │  exact equality │   │  tax?           │   │  price, tax     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │   TaxCategory   │   │ SearchOutcome   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  Exempt    0%   │   │  CloudHit       │       │
//! │  │  1800 = 18%     │   │  Essential 5%   │   │  CatalogHit     │       │
//! │  └─────────────────┘   │  Standard  18%  │   │  BackupHit      │       │
//! │                        │  Luxury    40%  │   │  BookDetected   │       │
//! │                        └─────────────────┘   │  ManualEntry... │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Candidate vs Confirmed
//! Lookup sources produce a `CandidateRecord`, which may be missing its price
//! or tax class. Only a `ConfirmedRecord` (price and tax present) is ever
//! stored locally or published to the cloud store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Barcode
// =============================================================================

/// A scanned product identifier.
///
/// The raw decoded string is kept verbatim: no trimming, no case folding.
/// Two barcodes are equal only if their strings are byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Barcode(String);

impl Barcode {
    /// Creates a barcode, rejecting the empty string.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::types::Barcode;
    ///
    /// assert!(Barcode::new("500123").is_ok());
    /// assert!(Barcode::new("").is_err());
    /// // Whitespace is significant
    /// assert_ne!(Barcode::new(" 978").unwrap(), Barcode::new("978").unwrap());
    /// ```
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::required("barcode"));
        }
        Ok(Barcode(raw))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Barcode {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Barcode::new(raw)
    }
}

impl From<Barcode> for String {
    fn from(barcode: Barcode) -> Self {
        barcode.0
    }
}

impl AsRef<str> for Barcode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (standard goods)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage.
    ///
    /// Remote rate tables send percentages as JSON numbers (`18` or `18.0`).
    /// Negative and non-finite values clamp to zero.
    pub fn from_percentage(pct: f64) -> Self {
        if !pct.is_finite() || pct <= 0.0 {
            return TaxRate(0);
        }
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

/// `1800` renders as `18%`, `825` as `8.25%`.
impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            write!(f, "{}%", whole)
        } else if frac % 10 == 0 {
            write!(f, "{}.{}%", whole, frac / 10)
        } else {
            write!(f, "{}.{:02}%", whole, frac)
        }
    }
}

// =============================================================================
// Tax Category
// =============================================================================

/// The fixed tax slabs a product can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum TaxCategory {
    /// Fresh produce, books and other zero-rated goods.
    Exempt,
    /// Packaged staples.
    Essential,
    /// Most goods.
    Standard,
    /// Sin and luxury goods.
    Luxury,
}

impl TaxCategory {
    pub const ALL: [TaxCategory; 4] = [
        TaxCategory::Exempt,
        TaxCategory::Essential,
        TaxCategory::Standard,
        TaxCategory::Luxury,
    ];

    /// Stable string id used in the cloud store and the local database.
    pub const fn id(&self) -> &'static str {
        match self {
            TaxCategory::Exempt => "exempt",
            TaxCategory::Essential => "essential",
            TaxCategory::Standard => "standard",
            TaxCategory::Luxury => "luxury",
        }
    }

    /// Built-in rate for this category.
    pub const fn default_rate(&self) -> TaxRate {
        match self {
            TaxCategory::Exempt => TaxRate::from_bps(0),
            TaxCategory::Essential => TaxRate::from_bps(500),
            TaxCategory::Standard => TaxRate::from_bps(1800),
            TaxCategory::Luxury => TaxRate::from_bps(4000),
        }
    }
}

impl fmt::Display for TaxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TaxCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaxCategory::ALL
            .into_iter()
            .find(|c| c.id() == s)
            .ok_or_else(|| CoreError::UnknownTaxCategory(s.to_string()))
    }
}

// =============================================================================
// Tax Class
// =============================================================================

/// How a record is taxed: by named category or by an explicit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxClass {
    Category(TaxCategory),
    Rate(TaxRate),
}

impl TaxClass {
    /// The category, if this class names one.
    pub fn category(&self) -> Option<TaxCategory> {
        match self {
            TaxClass::Category(category) => Some(*category),
            TaxClass::Rate(_) => None,
        }
    }
}

impl From<TaxCategory> for TaxClass {
    fn from(category: TaxCategory) -> Self {
        TaxClass::Category(category)
    }
}

impl From<TaxRate> for TaxClass {
    fn from(rate: TaxRate) -> Self {
        TaxClass::Rate(rate)
    }
}

impl fmt::Display for TaxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxClass::Category(category) => write!(f, "{}", category),
            TaxClass::Rate(rate) => write!(f, "{}", rate),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A product description produced by a lookup source.
///
/// Catalog sources usually know only the name and brand; price and tax are
/// filled in by the operator before the record is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub brand: String,
    pub price: Option<Money>,
    pub tax: Option<TaxClass>,
}

impl CandidateRecord {
    /// A candidate with only a name and brand.
    pub fn new(name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            brand: brand.into(),
            price: None,
            tax: None,
        }
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_tax(mut self, tax: impl Into<TaxClass>) -> Self {
        self.tax = Some(tax.into());
        self
    }

    /// Completes the candidate into a [`ConfirmedRecord`].
    ///
    /// Explicit `price` and `tax` arguments override whatever the candidate
    /// carried; a field missing from both is an error.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::{Barcode, CandidateRecord, TaxCategory};
    ///
    /// let barcode = Barcode::new("500123").unwrap();
    /// let record = CandidateRecord::new("Widget", "BrandX")
    ///     .confirm(barcode, Some(Money::from_cents(4999)), Some(TaxCategory::Standard.into()))
    ///     .unwrap();
    /// assert_eq!(record.price.cents(), 4999);
    /// ```
    pub fn confirm(
        self,
        barcode: Barcode,
        price: Option<Money>,
        tax: Option<TaxClass>,
    ) -> CoreResult<ConfirmedRecord> {
        let price = price.or(self.price).ok_or_else(|| CoreError::IncompleteRecord {
            barcode: barcode.to_string(),
            field: "price".to_string(),
        })?;
        let tax = tax.or(self.tax).ok_or_else(|| CoreError::IncompleteRecord {
            barcode: barcode.to_string(),
            field: "tax".to_string(),
        })?;

        Ok(ConfirmedRecord {
            barcode,
            name: self.name,
            brand: self.brand,
            price,
            tax,
        })
    }
}

/// A fully priced and tax-classified product record.
///
/// The only shape that is persisted locally or published to the cloud store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub barcode: Barcode,
    pub name: String,
    pub brand: String,
    pub price: Money,
    pub tax: TaxClass,
}

impl ConfirmedRecord {
    /// Drops the barcode, e.g. to pre-fill an editor.
    pub fn to_candidate(&self) -> CandidateRecord {
        CandidateRecord {
            name: self.name.clone(),
            brand: self.brand.clone(),
            price: Some(self.price),
            tax: Some(self.tax),
        }
    }
}

// =============================================================================
// Search Outcome
// =============================================================================

/// The single terminal result of one search session.
///
/// ## Outcome Sources
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  cloud store hit ─────────────────────────► CloudHit(record)            │
/// │  cloud miss + book prefix ────────────────► BookDetected(barcode)       │
/// │  first catalog "found" ───────────────────► CatalogHit(candidate, bc)   │
/// │  all catalogs miss + backup found ────────► BackupHit(candidate, bc)    │
/// │  everything missed ───────────────────────► ManualEntryRequired(bc)     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchOutcome {
    CloudHit {
        record: ConfirmedRecord,
    },
    CatalogHit {
        candidate: CandidateRecord,
        barcode: Barcode,
    },
    BackupHit {
        candidate: CandidateRecord,
        barcode: Barcode,
    },
    BookDetected {
        barcode: Barcode,
    },
    ManualEntryRequired {
        barcode: Barcode,
    },
}

impl SearchOutcome {
    /// The barcode this outcome resolves.
    pub fn barcode(&self) -> &Barcode {
        match self {
            SearchOutcome::CloudHit { record } => &record.barcode,
            SearchOutcome::CatalogHit { barcode, .. }
            | SearchOutcome::BackupHit { barcode, .. }
            | SearchOutcome::BookDetected { barcode }
            | SearchOutcome::ManualEntryRequired { barcode } => barcode,
        }
    }

    /// True when the operator has to type the record in from scratch.
    pub fn needs_manual_entry(&self) -> bool {
        matches!(
            self,
            SearchOutcome::BookDetected { .. } | SearchOutcome::ManualEntryRequired { .. }
        )
    }

    /// The record to pre-fill an editor with, if any source produced one.
    pub fn candidate(&self) -> Option<CandidateRecord> {
        match self {
            SearchOutcome::CloudHit { record } => Some(record.to_candidate()),
            SearchOutcome::CatalogHit { candidate, .. }
            | SearchOutcome::BackupHit { candidate, .. } => Some(candidate.clone()),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchOutcome::CloudHit { .. } => "cloud_hit",
            SearchOutcome::CatalogHit { .. } => "catalog_hit",
            SearchOutcome::BackupHit { .. } => "backup_hit",
            SearchOutcome::BookDetected { .. } => "book_detected",
            SearchOutcome::ManualEntryRequired { .. } => "manual_entry_required",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
