//! # Money Module
//!
//! Provides the `Money` type for handling shelf prices safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Catalog and cloud payloads carry prices as JSON numbers:               │
//! │    "price": 50.5                                                        │
//! │                                                                         │
//! │  Parsed as f64 and multiplied back out, 50.5 × 18 / 118 drifts in the  │
//! │  last digit depending on evaluation order.                              │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    "50.5" ──parse_decimal──► 5050 ──included_tax(18%)──► 770            │
//! │    No float ever touches the amount.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::parse_decimal("105.50").unwrap();
//! assert_eq!(price.cents(), 10550);
//! assert_eq!(price.to_string(), "105.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use crate::error::ValidationError;
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (paise, cents).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cloud payload "price" ──┐                                              │
/// │  Backup "lowest price" ──┼──► ConfirmedRecord.price ──► TaxBreakdown    │
/// │  Manual entry ───────────┘            │                                 │
/// │                                       └──► local history (price_cents)  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Parses a decimal amount such as `"105"`, `"50.5"` or `"0.99"`.
    ///
    /// ## Rules
    /// - Surrounding whitespace is ignored
    /// - Negative amounts are rejected (shelf prices are never negative)
    /// - A third fractional digit rounds half-up: `"1.005"` → 101
    /// - Further digits are ignored
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("50.5").unwrap().cents(), 5050);
    /// assert_eq!(Money::parse_decimal("1.005").unwrap().cents(), 101);
    /// assert!(Money::parse_decimal("-3").is_err());
    /// assert!(Money::parse_decimal("abc").is_err());
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Money, ValidationError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ValidationError::required("price"));
        }
        if input.starts_with('-') {
            return Err(ValidationError::MustNotBeNegative {
                field: "price".to_string(),
            });
        }

        let (major, minor) = match input.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (input, ""),
        };

        if major.is_empty() && minor.is_empty() {
            return Err(ValidationError::invalid_format("price", "no digits"));
        }
        if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ValidationError::invalid_format(
                "price",
                format!("'{}' is not a decimal number", input),
            ));
        }

        let too_large = || ValidationError::invalid_format("price", "amount is too large");

        let mut cents: i64 = 0;
        for digit in major.bytes() {
            cents = cents
                .checked_mul(10)
                .and_then(|c| c.checked_add(i64::from(digit - b'0')))
                .ok_or_else(too_large)?;
        }
        cents = cents.checked_mul(100).ok_or_else(too_large)?;

        let frac: Vec<i64> = minor.bytes().map(|b| i64::from(b - b'0')).collect();
        let tenths = frac.first().copied().unwrap_or(0);
        let hundredths = frac.get(1).copied().unwrap_or(0);
        let round_up = frac.get(2).map_or(false, |d| *d >= 5);

        cents = cents
            .checked_add(tenths * 10 + hundredths + i64::from(round_up))
            .ok_or_else(too_large)?;

        Ok(Money(cents))
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Extracts the tax already contained in a tax-inclusive price.
    ///
    /// ## Formula
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  Shelf price P already includes tax at rate r:                      │
    /// │                                                                     │
    /// │      P = net × (1 + r)                                              │
    /// │    tax = P × r / (1 + r)                                            │
    /// │                                                                     │
    /// │  In basis points:  tax = P × bps / (10000 + bps)                    │
    /// │  Rounded half-up to the minor unit, computed in i128.               │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// // ₹118.00 at 18% = ₹100.00 net + ₹18.00 tax
    /// let tax = Money::from_cents(11800).included_tax(TaxRate::from_bps(1800));
    /// assert_eq!(tax.cents(), 1800);
    /// ```
    pub fn included_tax(&self, rate: TaxRate) -> Money {
        if rate.is_zero() {
            return Money::zero();
        }

        let numerator = self.0 as i128 * rate.bps() as i128;
        let denominator = 10_000i128 + rate.bps() as i128;
        let tax = (2 * numerator + denominator) / (2 * denominator);

        Money(tax as i64)
    }

    /// Returns the price with its included tax removed.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let net = Money::from_cents(10500).net_of_tax(TaxRate::from_bps(500));
    /// assert_eq!(net.cents(), 10000);
    /// ```
    pub fn net_of_tax(&self, rate: TaxRate) -> Money {
        *self - self.included_tax(rate)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`"105.50"`); the currency symbol is a display
/// concern of the front end.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(10550).to_string(), "105.50");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse_decimal_shapes() {
        assert_eq!(Money::parse_decimal("105").unwrap().cents(), 10500);
        assert_eq!(Money::parse_decimal("105.0").unwrap().cents(), 10500);
        assert_eq!(Money::parse_decimal("50.5").unwrap().cents(), 5050);
        assert_eq!(Money::parse_decimal("0.99").unwrap().cents(), 99);
        assert_eq!(Money::parse_decimal(".5").unwrap().cents(), 50);
        assert_eq!(Money::parse_decimal("7.").unwrap().cents(), 700);
        assert_eq!(Money::parse_decimal(" 12.30 ").unwrap().cents(), 1230);
    }

    #[test]
    fn test_parse_decimal_rounds_third_digit() {
        assert_eq!(Money::parse_decimal("1.004").unwrap().cents(), 100);
        assert_eq!(Money::parse_decimal("1.005").unwrap().cents(), 101);
        assert_eq!(Money::parse_decimal("1.0049").unwrap().cents(), 100);
        assert_eq!(Money::parse_decimal("0.999").unwrap().cents(), 100);
    }

    #[test]
    fn test_parse_decimal_rejects_bad_input() {
        assert_eq!(
            Money::parse_decimal(""),
            Err(ValidationError::required("price"))
        );
        assert!(matches!(
            Money::parse_decimal("-1.00"),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
        assert!(Money::parse_decimal(".").is_err());
        assert!(Money::parse_decimal("1.2.3").is_err());
        assert!(Money::parse_decimal("12a").is_err());
        assert!(Money::parse_decimal("1e3").is_err());
        assert!(Money::parse_decimal("99999999999999999999").is_err());
    }

    #[test]
    fn test_included_tax_reference_rates() {
        // Exempt
        let price = Money::from_cents(10000);
        assert_eq!(price.included_tax(TaxRate::from_bps(0)).cents(), 0);
        assert_eq!(price.net_of_tax(TaxRate::from_bps(0)).cents(), 10000);

        // Essential 5%
        let price = Money::from_cents(10500);
        assert_eq!(price.included_tax(TaxRate::from_bps(500)).cents(), 500);
        assert_eq!(price.net_of_tax(TaxRate::from_bps(500)).cents(), 10000);

        // Standard 18%
        let price = Money::from_cents(11800);
        assert_eq!(price.included_tax(TaxRate::from_bps(1800)).cents(), 1800);

        // Luxury 40%
        let price = Money::from_cents(14000);
        assert_eq!(price.included_tax(TaxRate::from_bps(4000)).cents(), 4000);
    }

    #[test]
    fn test_included_tax_rounds_half_up() {
        // 100.00 at 18% = 15.2542... → 15.25
        let tax = Money::from_cents(10000).included_tax(TaxRate::from_bps(1800));
        assert_eq!(tax.cents(), 1525);

        // 50.50 at 18% = 7.7033... → 7.70
        let tax = Money::from_cents(5050).included_tax(TaxRate::from_bps(1800));
        assert_eq!(tax.cents(), 770);
    }

    #[test]
    fn test_zero_price_has_no_tax() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.included_tax(TaxRate::from_bps(4000)), Money::zero());
    }

    #[test]
    fn test_arithmetic() {
        let mut a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        a += b;
        assert_eq!(a.cents(), 1500);
        assert!((b - a).is_negative());
    }
}
