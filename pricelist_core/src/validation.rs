//! # Input Validation
//!
//! Every command validates its raw input here before anything is written.
//! Raw values are the text the operator typed; validated values are typed
//! drafts and [`FieldUpdate`]s.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::errors::{PriceError, PriceResult};
use crate::material::{FieldUpdate, Material, MaterialDraft};
use crate::numeric::parse_decimal;
use crate::settings::PricingSettings;

/// Shortest accepted material name, in characters
pub const MIN_NAME_LENGTH: usize = 2;

/// Longest accepted name or unit, in characters
pub const MAX_TEXT_LENGTH: usize = 120;

/// Highest accepted percentage for markup and profit margin
pub const MAX_PERCENTAGE: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Upper sanity bound for a real price (exclusive): one trillion
pub fn max_real_price() -> Decimal {
    Decimal::from(1_000_000_000_000i64)
}

/// Raw add-material form values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialInput {
    pub name: String,
    pub real_price: String,
    pub unit: String,
}

impl MaterialInput {
    pub fn new(
        name: impl Into<String>,
        real_price: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        MaterialInput {
            name: name.into(),
            real_price: real_price.into(),
            unit: unit.into(),
        }
    }
}

/// Validate the add form and build a draft carrying the current defaults.
pub fn validate_new_material(
    input: &MaterialInput,
    settings: &PricingSettings,
) -> PriceResult<MaterialDraft> {
    let name = validate_name(&input.name)?;
    let real_price = validate_real_price(&input.real_price)?;
    let unit = validate_unit(&input.unit)?;

    Ok(MaterialDraft::new(
        name,
        unit,
        real_price,
        settings.default_markup,
        settings.profit_margin,
    ))
}

pub fn validate_name(raw: &str) -> PriceResult<String> {
    let name = raw.trim();
    let length = name.chars().count();
    if length < MIN_NAME_LENGTH {
        return Err(PriceError::validation(
            "name",
            raw,
            format!("Name must be at least {} characters", MIN_NAME_LENGTH),
        ));
    }
    if length > MAX_TEXT_LENGTH {
        return Err(PriceError::validation(
            "name",
            raw,
            format!("Name must be at most {} characters", MAX_TEXT_LENGTH),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_unit(raw: &str) -> PriceResult<String> {
    let unit = raw.trim();
    if unit.is_empty() {
        return Err(PriceError::validation("unit", raw, "Unit is required"));
    }
    if unit.chars().count() > MAX_TEXT_LENGTH {
        return Err(PriceError::validation(
            "unit",
            raw,
            format!("Unit must be at most {} characters", MAX_TEXT_LENGTH),
        ));
    }
    Ok(unit.to_string())
}

/// A real price must be numeric, positive and below the sanity bound.
pub fn validate_real_price(raw: &str) -> PriceResult<Decimal> {
    let price = parse_decimal(raw)
        .ok_or_else(|| PriceError::validation("realPrice", raw, "Price must be a number"))?;
    if price <= Decimal::ZERO {
        return Err(PriceError::validation("realPrice", raw, "Price must be greater than zero"));
    }
    if price >= max_real_price() {
        return Err(PriceError::validation(
            "realPrice",
            raw,
            format!("Price must be below {}", max_real_price()),
        ));
    }
    Ok(price)
}

/// A percentage must be numeric, not negative, and at most [`MAX_PERCENTAGE`].
pub fn validate_percentage(field: &str, raw: &str) -> PriceResult<Decimal> {
    let value = parse_decimal(raw)
        .ok_or_else(|| PriceError::validation(field, raw, "Value must be a number"))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PriceError::validation(field, raw, "Value must not be negative"));
    }
    if value > MAX_PERCENTAGE {
        return Err(PriceError::validation(
            field,
            raw,
            format!("Value must be at most {}", MAX_PERCENTAGE),
        ));
    }
    Ok(value)
}

/// Validate both operator defaults.
pub fn validate_settings(markup: &str, profit_margin: &str) -> PriceResult<PricingSettings> {
    Ok(PricingSettings::new(
        validate_percentage("defaultMarkup", markup)?,
        validate_percentage("profitMargin", profit_margin)?,
    ))
}

/// The fields an edit command may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Name,
    Unit,
    RealPrice,
    Markup,
    ProfitMargin,
}

impl EditableField {
    /// Validate a raw value for this field.
    pub fn parse_value(self, raw: &str) -> PriceResult<FieldUpdate> {
        match self {
            EditableField::Name => validate_name(raw).map(FieldUpdate::Name),
            EditableField::Unit => validate_unit(raw).map(FieldUpdate::Unit),
            EditableField::RealPrice => validate_real_price(raw).map(FieldUpdate::RealPrice),
            EditableField::Markup => validate_percentage("markup", raw).map(FieldUpdate::Markup),
            EditableField::ProfitMargin => {
                validate_percentage("profitMargin", raw).map(FieldUpdate::ProfitMargin)
            }
        }
    }
}

impl FromStr for EditableField {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(EditableField::Name),
            "unit" => Ok(EditableField::Unit),
            "realprice" | "price" => Ok(EditableField::RealPrice),
            "markup" => Ok(EditableField::Markup),
            "profitmargin" | "margin" => Ok(EditableField::ProfitMargin),
            _ => Err(PriceError::validation("field", s, "Field cannot be edited")),
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditableField::Name => "name",
            EditableField::Unit => "unit",
            EditableField::RealPrice => "realPrice",
            EditableField::Markup => "markup",
            EditableField::ProfitMargin => "profitMargin",
        };
        f.write_str(name)
    }
}

/// Find an existing material whose name matches, ignoring case and padding.
pub fn find_duplicate_name<'a>(materials: &'a [Material], name: &str) -> Option<&'a Material> {
    let wanted = name.trim().to_lowercase();
    materials.iter().find(|m| m.name.trim().to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialId;

    #[test]
    fn test_valid_material() {
        let input = MaterialInput::new("  Freon R32 ", "120000", " kg");
        let draft = validate_new_material(&input, &PricingSettings::default()).unwrap();
        assert_eq!(draft.name, "Freon R32");
        assert_eq!(draft.unit, "kg");
        assert_eq!(draft.real_price, Decimal::from(120000));
        assert_eq!(draft.markup, Decimal::from(30));
        assert_eq!(draft.profit_margin, Decimal::from(15));
    }

    #[test]
    fn test_zero_price_rejected() {
        let input = MaterialInput::new("Kabel", "0", "meter");
        let err = validate_new_material(&input, &PricingSettings::default()).unwrap_err();
        match err {
            PriceError::Validation { field, .. } => assert_eq!(field, "realPrice"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_inputs_rejected() {
        let settings = PricingSettings::default();
        let rejected = |name: &str, price: &str, unit: &str| {
            validate_new_material(&MaterialInput::new(name, price, unit), &settings).is_err()
        };
        assert!(rejected("K", "100", "m"));
        assert!(rejected("Kabel", "abc", "m"));
        assert!(rejected("Kabel", "-5", "m"));
        assert!(rejected("Kabel", "1000000000000", "m"));
        assert!(rejected("Kabel", "100", "  "));
    }

    #[test]
    fn test_percentage_rules() {
        assert_eq!(validate_percentage("markup", "0").unwrap(), Decimal::ZERO);
        assert_eq!(validate_percentage("markup", "12.5").unwrap(), Decimal::new(125, 1));
        assert!(validate_percentage("markup", "-1").is_err());
        assert!(validate_percentage("markup", "1000.5").is_err());
        assert!(validate_percentage("markup", "x").is_err());
    }

    #[test]
    fn test_editable_field_parsing() {
        assert_eq!("margin".parse::<EditableField>().unwrap(), EditableField::ProfitMargin);
        assert_eq!("realPrice".parse::<EditableField>().unwrap(), EditableField::RealPrice);
        assert!("createdAt".parse::<EditableField>().is_err());

        assert_eq!(
            EditableField::Markup.parse_value("40").unwrap(),
            FieldUpdate::Markup(Decimal::from(40))
        );
        assert!(EditableField::RealPrice.parse_value("0").is_err());
    }

    #[test]
    fn test_duplicate_names_ignore_case() {
        let existing = vec![Material::from_draft(
            MaterialId::new("a"),
            &MaterialDraft::new("Freon R32", "kg", Decimal::ONE, Decimal::ZERO, Decimal::ZERO),
        )];
        assert!(find_duplicate_name(&existing, " freon r32").is_some());
        assert!(find_duplicate_name(&existing, "Freon R22").is_none());
    }
}
