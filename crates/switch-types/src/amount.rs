//! `Amount` - currency code + decimal value.
//!
//! The decimal value is kept as the wire string verbatim: the fingerprint
//! is computed over the canonicalized prepare payload and must be
//! stable byte-for-byte across processes, so `Amount` never reformats the
//! value it was constructed with. `rust_decimal` is used only to check that
//! the string is well-formed, never to
//! re-stringify it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub amount: String,
}

impl Amount {
    pub fn new(currency: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            amount: amount.into(),
        }
    }

    /// Parses the decimal value, used by the validator to reject
    /// malformed amounts. Never called on the fingerprinting path.
    pub fn parse_decimal(&self) -> Option<Decimal> {
        self.amount.parse::<Decimal>().ok().filter(|d| !d.is_sign_negative())
    }

    pub fn is_well_formed(&self) -> bool {
        self.parse_decimal().is_some()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_decimal_amount() {
        let a = Amount::new("USD", "100.00");
        assert!(a.is_well_formed());
    }

    #[test]
    fn malformed_amount_rejected() {
        let a = Amount::new("USD", "not-a-number");
        assert!(!a.is_well_formed());
    }

    #[test]
    fn negative_amount_rejected() {
        let a = Amount::new("USD", "-5.00");
        assert!(!a.is_well_formed());
    }

    #[test]
    fn wire_string_preserved_verbatim() {
        let a = Amount::new("USD", "100.00");
        assert_eq!(a.amount, "100.00");
    }
}
