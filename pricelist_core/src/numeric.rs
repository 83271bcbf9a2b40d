//! # Numeric Helpers
//!
//! Prices and percentages are [`Decimal`] in memory and plain JSON numbers on
//! the wire. Reads are lenient: a number, a numeric string or a missing value
//! are all accepted, and anything that does not parse is treated as zero.
//!
//! ```rust
//! use pricelist_core::numeric::parse_decimal;
//! use rust_decimal::Decimal;
//!
//! assert_eq!(parse_decimal(" 12.5 "), Some(Decimal::new(125, 1)));
//! assert_eq!(parse_decimal("abc"), None);
//! ```

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// Parse user or file text as a decimal. Accepts plain and scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Convert a finite float to a decimal via its shortest round-trip text.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    parse_decimal(&value.to_string())
}

/// Convert any JSON value to a decimal, zero when it is not numeric.
pub fn decimal_from_value(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()).unwrap_or_default(),
        Value::String(s) => parse_decimal(s).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Lossy conversion used for charts and JSON output.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Serde adapter: write a JSON number, read leniently.
///
/// Use with `#[serde(default, with = "crate::numeric::lenient")]`.
pub mod lenient {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract().is_zero() {
            if let Some(whole) = value.to_i64() {
                return serializer.serialize_i64(whole);
            }
        }
        serializer.serialize_f64(super::to_f64(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().map(super::decimal_from_value).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(default, with = "lenient")]
        amount: Decimal,
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("85000"), Some(Decimal::from(85000)));
        assert_eq!(parse_decimal("1e3"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("12abc"), None);
    }

    #[test]
    fn test_decimal_from_value_is_lenient() {
        assert_eq!(decimal_from_value(&json!(25)), Decimal::from(25));
        assert_eq!(decimal_from_value(&json!("15")), Decimal::from(15));
        assert_eq!(decimal_from_value(&json!(0.1)), Decimal::new(1, 1));
        assert_eq!(decimal_from_value(&json!(null)), Decimal::ZERO);
        assert_eq!(decimal_from_value(&json!("n/a")), Decimal::ZERO);
        assert_eq!(decimal_from_value(&json!([1, 2])), Decimal::ZERO);
    }

    #[test]
    fn test_lenient_serde() {
        let missing: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.amount, Decimal::ZERO);

        let text: Holder = serde_json::from_str(r#"{"amount":"30"}"#).unwrap();
        assert_eq!(text.amount, Decimal::from(30));

        let whole = serde_json::to_string(&Holder { amount: Decimal::from(106250) }).unwrap();
        assert_eq!(whole, r#"{"amount":106250}"#);

        let fractional = serde_json::to_string(&Holder {
            amount: Decimal::new(1221875, 1),
        })
        .unwrap();
        assert_eq!(fractional, r#"{"amount":122187.5}"#);
    }
}
