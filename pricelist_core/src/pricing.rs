//! # Pricing Calculator
//!
//! Derives the resale figures of a material from its stored real price,
//! markup and profit margin:
//!
//! ```text
//! markupPrice = realPrice * (1 + markup / 100)
//! finalPrice  = markupPrice * (1 + profitMargin / 100)
//! profit      = finalPrice - realPrice
//! ```
//!
//! The calculation is pure and never fails. Fields that were missing or not
//! numeric when the record was read are already zero (see
//! [`crate::numeric`]), so a zero real price yields all-zero results.
//!
//! ## Example
//!
//! ```rust
//! use pricelist_core::pricing::compute_parts;
//! use rust_decimal::Decimal;
//!
//! let prices = compute_parts(Decimal::from(85000), Decimal::from(25), Decimal::from(15));
//! assert_eq!(prices.markup_price, Decimal::from(106250));
//! assert_eq!(prices.final_price, Decimal::new(1221875, 1));
//! assert_eq!(prices.profit, Decimal::new(371875, 1));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::material::Material;

/// Derived price fields of one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    #[serde(with = "crate::numeric::lenient")]
    pub markup_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub final_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub profit: Decimal,
}

/// Compute the derived prices of a material.
pub fn compute(material: &Material) -> PriceBreakdown {
    compute_parts(material.real_price, material.markup, material.profit_margin)
}

/// Compute derived prices from the three stored inputs.
pub fn compute_parts(
    real_price: Decimal,
    markup: Decimal,
    profit_margin: Decimal,
) -> PriceBreakdown {
    let markup_price = mul(real_price, factor(markup));
    let final_price = mul(markup_price, factor(profit_margin));
    let profit = final_price
        .checked_sub(real_price)
        .unwrap_or_else(|| saturate(final_price.is_sign_negative()));

    PriceBreakdown {
        markup_price,
        final_price,
        profit,
    }
}

/// `1 + percent / 100`
fn factor(percent: Decimal) -> Decimal {
    let fraction = percent / Decimal::ONE_HUNDRED;
    Decimal::ONE
        .checked_add(fraction)
        .unwrap_or_else(|| saturate(fraction.is_sign_negative()))
}

fn mul(a: Decimal, b: Decimal) -> Decimal {
    a.checked_mul(b)
        .unwrap_or_else(|| saturate(a.is_sign_negative() != b.is_sign_negative()))
}

fn saturate(negative: bool) -> Decimal {
    if negative {
        Decimal::MIN
    } else {
        Decimal::MAX
    }
}

/// Running totals across a collection.
///
/// Build it from the same [`PriceBreakdown`]s used for the table rows so the
/// summary always agrees with the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub count: usize,
    #[serde(with = "crate::numeric::lenient")]
    pub total_real_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub total_markup_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub total_final_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub total_profit: Decimal,
}

impl Totals {
    /// Add one row's figures.
    pub fn accumulate(&mut self, real_price: Decimal, prices: &PriceBreakdown) {
        self.count += 1;
        self.total_real_price = add(self.total_real_price, real_price);
        self.total_markup_price = add(self.total_markup_price, prices.markup_price);
        self.total_final_price = add(self.total_final_price, prices.final_price);
        self.total_profit = add(self.total_profit, prices.profit);
    }

    /// Totals of a whole collection.
    pub fn of<'a>(materials: impl IntoIterator<Item = &'a Material>) -> Self {
        let mut totals = Totals::default();
        for material in materials {
            totals.accumulate(material.real_price, &compute(material));
        }
        totals
    }
}

fn add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or_else(|| saturate(b.is_sign_negative()))
}
