//! Payment values crossing the ledger boundary.
//!
//! Users enter decimal amounts in the display unit (ether). The ledger only
//! understands integer base units (wei), one display unit being `10^18` base
//! units. Parsing never truncates: an amount that cannot be represented exactly
//! in base units is rejected.

use bigdecimal::BigDecimal;
use ethers::types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::value_objects::quantity::ShareQuantity;

/// Decimal places between the display unit and the base unit.
pub const BASE_UNIT_DECIMALS: usize = 18;

const BASE_UNITS_PER_DISPLAY_UNIT: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a decimal amount")]
    Malformed(String),

    #[error("'{0}' is negative")]
    Negative(String),

    #[error("'{0}' is zero, a positive amount is required")]
    Zero(String),

    #[error("'{0}' has more than 18 fractional digits")]
    TooPrecise(String),

    #[error("'{0}' exceeds the ledger value range")]
    Overflow(String),
}

/// An amount of value held in ledger base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EtherAmount(U256);

impl EtherAmount {
    pub fn from_base_units(base_units: U256) -> Self {
        EtherAmount(base_units)
    }

    pub fn from_whole_units(units: u64) -> Self {
        EtherAmount(U256::from(units) * U256::from(BASE_UNITS_PER_DISPLAY_UNIT))
    }

    /// Price of `quantity` shares: one display unit per share.
    pub fn for_shares(quantity: ShareQuantity) -> Self {
        Self::from_whole_units(quantity.value())
    }

    pub fn base_units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: EtherAmount) -> Option<EtherAmount> {
        self.0.checked_add(other.0).map(EtherAmount)
    }

    pub fn checked_sub(&self, other: EtherAmount) -> Option<EtherAmount> {
        self.0.checked_sub(other.0).map(EtherAmount)
    }

    /// Parse a human-entered decimal such as `"2"` or `"1.5"`.
    pub fn parse_display(input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(AmountError::Negative(trimmed.to_string()));
        }

        // Plain positional notation only; exponents would let a short input
        // expand into an arbitrarily large integer.
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let mut seen_point = false;
        let mut seen_digit = false;
        for c in digits.chars() {
            match c {
                '0'..='9' => seen_digit = true,
                '.' if !seen_point => seen_point = true,
                _ => return Err(AmountError::Malformed(trimmed.to_string())),
            }
        }
        if !seen_digit {
            return Err(AmountError::Malformed(trimmed.to_string()));
        }

        let decimal = BigDecimal::from_str(digits)
            .map_err(|_| AmountError::Malformed(trimmed.to_string()))?;
        let scaled = decimal * BigDecimal::from(BASE_UNITS_PER_DISPLAY_UNIT);
        let whole = scaled.with_scale(0);
        if whole != scaled {
            return Err(AmountError::TooPrecise(trimmed.to_string()));
        }

        let (integer, _) = whole.as_bigint_and_exponent();
        let base_units = U256::from_dec_str(&integer.to_string())
            .map_err(|_| AmountError::Overflow(trimmed.to_string()))?;
        Ok(EtherAmount(base_units))
    }

    /// Like `parse_display`, but zero is rejected.
    pub fn parse_positive(input: &str) -> Result<Self, AmountError> {
        let amount = Self::parse_display(input)?;
        if amount.is_zero() {
            return Err(AmountError::Zero(input.trim().to_string()));
        }
        Ok(amount)
    }

    /// Display-unit rendering with trailing fractional zeros removed.
    pub fn to_display(&self) -> String {
        let (whole, fraction) = self.0.div_mod(U256::from(BASE_UNITS_PER_DISPLAY_UNIT));
        if fraction.is_zero() {
            return whole.to_string();
        }
        let padded = format!("{:0>width$}", fraction.to_string(), width = BASE_UNIT_DECIMALS);
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl fmt::Display for EtherAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

impl FromStr for EtherAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EtherAmount::parse_display(s)
    }
}

impl Serialize for EtherAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display())
    }
}

impl<'de> Deserialize<'de> for EtherAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EtherAmount::parse_display(&raw).map_err(serde::de::Error::custom)
    }
}
