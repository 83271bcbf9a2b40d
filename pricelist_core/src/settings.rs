//! # Pricing Settings
//!
//! The two operator defaults: the markup new materials start with, and the
//! profit margin. Both are also what "apply margins to all" writes.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Markup percentage used when none is configured
pub const DEFAULT_MARKUP: Decimal = Decimal::from_parts(30, 0, 0, false, 0);

/// Profit margin percentage used when none is configured
pub const DEFAULT_PROFIT_MARGIN: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Operator defaults, persisted under the `settings` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSettings {
    #[serde(
        default = "default_markup",
        deserialize_with = "markup_or_default",
        serialize_with = "crate::numeric::lenient::serialize"
    )]
    pub default_markup: Decimal,

    #[serde(
        default = "default_profit_margin",
        deserialize_with = "margin_or_default",
        serialize_with = "crate::numeric::lenient::serialize"
    )]
    pub profit_margin: Decimal,
}

impl PricingSettings {
    pub fn new(default_markup: Decimal, profit_margin: Decimal) -> Self {
        PricingSettings {
            default_markup,
            profit_margin,
        }
    }
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings::new(DEFAULT_MARKUP, DEFAULT_PROFIT_MARGIN)
    }
}

fn default_markup() -> Decimal {
    DEFAULT_MARKUP
}

fn default_profit_margin() -> Decimal {
    DEFAULT_PROFIT_MARGIN
}

// Older front-ends stored the raw input text ("30"); non-numeric text falls
// back to the default rather than to zero.
fn or_default<'de, D: Deserializer<'de>>(
    deserializer: D,
    fallback: Decimal,
) -> Result<Decimal, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(n)) => crate::numeric::parse_decimal(&n.to_string()),
        Some(Value::String(s)) => crate::numeric::parse_decimal(&s),
        _ => None,
    };
    Ok(parsed.filter(|d| !d.is_sign_negative()).unwrap_or(fallback))
}

fn markup_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    or_default(deserializer, DEFAULT_MARKUP)
}

fn margin_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    or_default(deserializer, DEFAULT_PROFIT_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PricingSettings::default();
        assert_eq!(settings.default_markup, Decimal::from(30));
        assert_eq!(settings.profit_margin, Decimal::from(15));
    }

    #[test]
    fn test_settings_json() {
        let settings = PricingSettings::new(Decimal::from(30), Decimal::new(125, 1));
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"defaultMarkup":30,"profitMargin":12.5}"#);
    }

    #[test]
    fn test_settings_read_text_and_missing_values() {
        let settings: PricingSettings = serde_json::from_str(r#"{"defaultMarkup":"40"}"#).unwrap();
        assert_eq!(settings.default_markup, Decimal::from(40));
        assert_eq!(settings.profit_margin, DEFAULT_PROFIT_MARGIN);

        let garbage: PricingSettings =
            serde_json::from_str(r#"{"defaultMarkup":"abc","profitMargin":-5}"#).unwrap();
        assert_eq!(garbage, PricingSettings::default());

        let zero: PricingSettings =
            serde_json::from_str(r#"{"defaultMarkup":0,"profitMargin":0}"#).unwrap();
        assert_eq!(zero.default_markup, Decimal::ZERO);
    }
}
