//! # Validation Module
//!
//! Input validation for records that an operator completes by hand.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: CLI arguments (clap)                                         │
//! │  ├── Presence of --name / --price / --tax                              │
//! │  └── Money::parse_decimal for the price                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: ScanService::confirm                                         │
//! │  └── THIS MODULE: name, brand and price rules                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── CHECK (price_cents >= 0)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{best_name, validate_product_name};
//!
//! validate_product_name("Coca-Cola 330ml").unwrap();
//! assert_eq!(best_name(Some(""), Some("Cola")), "Cola");
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::ConfirmedRecord;
use crate::{MAX_BRAND_LEN, MAX_NAME_LEN, UNKNOWN_PRODUCT_NAME};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Widget").is_ok());
/// assert!(validate_product_name("   ").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a brand. Empty is allowed (many catalog entries have none).
pub fn validate_brand(brand: &str) -> ValidationResult<()> {
    if brand.trim().chars().count() > MAX_BRAND_LEN {
        return Err(ValidationError::TooLong {
            field: "brand".to_string(),
            max: MAX_BRAND_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a shelf price. Zero is allowed (free samples).
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates every operator-entered field of a confirmed record.
pub fn validate_record(record: &ConfirmedRecord) -> ValidationResult<()> {
    validate_product_name(&record.name)?;
    validate_brand(&record.brand)?;
    validate_price(record.price)?;
    Ok(())
}

// =============================================================================
// Name Selection
// =============================================================================

/// Picks the display name from a catalog payload.
///
/// The primary name wins unless it is absent or empty; then the fallback;
/// then `"Unknown Product"`. Whitespace-only names count as present.
///
/// ## Example
/// ```rust
/// use tally_core::validation::best_name;
///
/// assert_eq!(best_name(Some("Cola"), Some("Cola EN")), "Cola");
/// assert_eq!(best_name(None, Some("Cola EN")), "Cola EN");
/// assert_eq!(best_name(Some(""), None), "Unknown Product");
/// assert_eq!(best_name(Some(" "), Some("Cola EN")), " ");
/// ```
pub fn best_name(primary: Option<&str>, fallback: Option<&str>) -> String {
    [primary, fallback]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_PRODUCT_NAME)
        .to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
