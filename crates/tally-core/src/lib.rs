//! # tally-core: Pure Domain Logic for Tally
//!
//! Everything Tally knows about barcodes, products and tax lives here as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/cli (`tally`)                           │   │
//! │  │          scan ──► confirm ──► history ──► clear                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     tally-lookup (cloud → catalog race → backup → manual)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │    tax    │  │classifier │  │   │
//! │  │   │  Barcode  │  │   Money   │  │ TaxTable  │  │  978/890  │  │   │
//! │  │   │  Records  │  │ incl. tax │  │ Breakdown │  │  prefixes │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Barcode, candidate/confirmed records, search outcomes
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`tax`] - Category rate table and tax-inclusive breakdowns
//! - [`classifier`] - Barcode prefix routing (books, regional retail)
//! - [`validation`] - Input validation for manually entered records
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::TaxRate;
//!
//! // Shelf prices include tax: ₹105.00 at 5% carries ₹5.00 of tax
//! let price = Money::from_cents(10500);
//! let tax = price.included_tax(TaxRate::from_bps(500));
//! assert_eq!(tax.cents(), 500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classifier;
pub mod error;
pub mod money;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use classifier::{classify, BarcodeRoute};
pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use tax::{TaxBreakdown, TaxTable};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Name shown when no source supplied a usable product name.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// Brand recorded when the crowdsourced store has no brand for an item.
pub const DEFAULT_BRAND: &str = "Generic";

/// Maximum length of a product name.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length of a brand.
pub const MAX_BRAND_LEN: usize = 100;
