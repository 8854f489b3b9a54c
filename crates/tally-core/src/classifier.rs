//! # Barcode Classifier
//!
//! Maps a raw barcode to a routing hint by its GS1 prefix.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "978..."  ──► Book            catalog race is skipped                  │
//! │  "890..."  ──► RegionalRetail  same path as General                     │
//! │  anything  ──► General                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The match is a literal prefix test on the untrimmed string, so `" 978..."`
//! (leading space) is `General`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bookland EAN prefix.
pub const BOOK_PREFIX: &str = "978";

/// GS1 India prefix.
pub const REGIONAL_RETAIL_PREFIX: &str = "890";

/// Routing hint derived from a barcode prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeRoute {
    Book,
    RegionalRetail,
    General,
}

impl BarcodeRoute {
    /// Books are not listed by the product catalogs, so searching them is
    /// wasted work.
    #[inline]
    pub const fn skips_catalog_race(&self) -> bool {
        matches!(self, BarcodeRoute::Book)
    }
}

impl fmt::Display for BarcodeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BarcodeRoute::Book => "book",
            BarcodeRoute::RegionalRetail => "regional_retail",
            BarcodeRoute::General => "general",
        };
        f.write_str(label)
    }
}

/// Classifies a raw barcode string.
///
/// ## Example
/// ```rust
/// use tally_core::classifier::{classify, BarcodeRoute};
///
/// assert_eq!(classify("9781234"), BarcodeRoute::Book);
/// assert_eq!(classify("890111"), BarcodeRoute::RegionalRetail);
/// assert_eq!(classify("500123"), BarcodeRoute::General);
/// assert_eq!(classify(""), BarcodeRoute::General);
/// ```
pub fn classify(raw: &str) -> BarcodeRoute {
    if raw.starts_with(BOOK_PREFIX) {
        BarcodeRoute::Book
    } else if raw.starts_with(REGIONAL_RETAIL_PREFIX) {
        BarcodeRoute::RegionalRetail
    } else {
        BarcodeRoute::General
    }
}
