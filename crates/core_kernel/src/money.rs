//! Amount handling with precise decimal arithmetic
//!
//! The ledger is single-currency. Amounts are kept as `rust_decimal::Decimal`
//! in major units (dollars), matching the `NUMERIC` columns of the store.
//! Billing processors report amounts in minor units (cents); the helpers here
//! convert between the two without going through floating point.

use rust_decimal::Decimal;
use thiserror::Error;

/// Number of decimal places carried by a major-unit amount
pub const MAJOR_UNIT_DECIMAL_PLACES: u32 = 2;

/// Errors that can occur during amount conversions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// Converts an integer amount in minor units (cents) to major units
///
/// The conversion is exact: `12345` becomes `123.45`.
pub fn from_minor_units(minor_units: i64) -> Decimal {
    Decimal::new(minor_units, MAJOR_UNIT_DECIMAL_PLACES)
}

/// Converts a major-unit amount back to integer minor units
///
/// # Errors
///
/// Returns `MoneyError::InvalidAmount` if the amount carries more precision
/// than a cent, and `MoneyError::Overflow` if it does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(MoneyError::Overflow)?;

    if scaled.fract() != Decimal::ZERO {
        return Err(MoneyError::InvalidAmount(format!(
            "{} has sub-cent precision",
            amount
        )));
    }

    i64::try_from(scaled.trunc()).map_err(|_| MoneyError::Overflow)
}
