//! # Material Records
//!
//! A [`Material`] is the only entity of the price list: a name, a unit, the
//! acquisition cost and two percentages. Derived prices are never stored; see
//! [`crate::pricing`].
//!
//! ## JSON Shape
//!
//! Materials serialize with camelCase keys so exported files stay readable by
//! the browser front-end that shares the collection:
//!
//! ```text
//! { "id": "x1", "name": "Freon R32", "unit": "kg", "realPrice": 120000,
//!   "markup": 35, "profitMargin": 15, "createdAt": "...", "updatedAt": "..." }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::{self, PriceBreakdown};

/// Prefix for ids minted on this machine rather than by the remote store
const LOCAL_ID_PREFIX: &str = "local-";

/// Opaque material identifier, normally assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(String);

impl MaterialId {
    pub fn new(id: impl Into<String>) -> Self {
        MaterialId(id.into())
    }

    /// Mint an id for a record that only exists on this machine.
    pub fn local() -> Self {
        MaterialId(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids minted by [`MaterialId::local`].
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A priced material line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    /// Absent until the record has been persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MaterialId>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub unit: String,

    /// Acquisition cost
    #[serde(default, with = "crate::numeric::lenient")]
    pub real_price: Decimal,

    /// Percentage applied to the real price
    #[serde(default, with = "crate::numeric::lenient")]
    pub markup: Decimal,

    /// Percentage applied to the markup price
    #[serde(default, with = "crate::numeric::lenient")]
    pub profit_margin: Decimal,

    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Set when the record was created by an import
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
}

impl Material {
    /// Build a persisted record from a validated draft.
    pub fn from_draft(id: MaterialId, draft: &MaterialDraft) -> Self {
        let mut material = draft.to_material();
        material.id = Some(id);
        material
    }

    /// Derived prices, recomputed on every call.
    pub fn prices(&self) -> PriceBreakdown {
        pricing::compute(self)
    }

    /// True when this record carries the given id.
    pub fn has_id(&self, id: &MaterialId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// Strip store-owned fields, keeping what a new remote entry needs.
    pub fn to_draft(&self) -> MaterialDraft {
        MaterialDraft {
            name: self.name.clone(),
            unit: self.unit.clone(),
            real_price: self.real_price,
            markup: self.markup,
            profit_margin: self.profit_margin,
            created_at: self.created_at,
            updated_at: self.updated_at,
            imported_at: self.imported_at,
        }
    }
}

/// A material that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDraft {
    pub name: String,
    pub unit: String,
    pub real_price: Decimal,
    pub markup: Decimal,
    pub profit_margin: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
}

impl MaterialDraft {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        real_price: Decimal,
        markup: Decimal,
        profit_margin: Decimal,
    ) -> Self {
        MaterialDraft {
            name: name.into(),
            unit: unit.into(),
            real_price,
            markup,
            profit_margin,
            created_at: None,
            updated_at: None,
            imported_at: None,
        }
    }

    /// Stamp creation and update times.
    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        self.created_at = Some(now);
        self.updated_at = Some(now);
        self
    }

    pub fn to_material(&self) -> Material {
        Material {
            id: None,
            name: self.name.clone(),
            unit: self.unit.clone(),
            real_price: self.real_price,
            markup: self.markup,
            profit_margin: self.profit_margin,
            created_at: self.created_at,
            updated_at: self.updated_at,
            imported_at: self.imported_at,
        }
    }
}

/// The fields a user may change on an existing material.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Unit(String),
    RealPrice(Decimal),
    Markup(Decimal),
    ProfitMargin(Decimal),
}

impl FieldUpdate {
    /// Field name as stored in the remote document
    pub fn field_name(&self) -> &'static str {
        match self {
            FieldUpdate::Name(_) => "name",
            FieldUpdate::Unit(_) => "unit",
            FieldUpdate::RealPrice(_) => "realPrice",
            FieldUpdate::Markup(_) => "markup",
            FieldUpdate::ProfitMargin(_) => "profitMargin",
        }
    }

    pub fn apply(&self, material: &mut Material) {
        match self {
            FieldUpdate::Name(name) => material.name = name.clone(),
            FieldUpdate::Unit(unit) => material.unit = unit.clone(),
            FieldUpdate::RealPrice(price) => material.real_price = *price,
            FieldUpdate::Markup(markup) => material.markup = *markup,
            FieldUpdate::ProfitMargin(margin) => material.profit_margin = *margin,
        }
    }
}

/// A partial update: one or more field changes plus the new update time.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPatch {
    pub updates: Vec<FieldUpdate>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialPatch {
    pub fn new(updates: Vec<FieldUpdate>, updated_at: DateTime<Utc>) -> Self {
        MaterialPatch { updates, updated_at }
    }

    pub fn single(update: FieldUpdate, updated_at: DateTime<Utc>) -> Self {
        MaterialPatch::new(vec![update], updated_at)
    }

    pub fn apply_to(&self, material: &mut Material) {
        for update in &self.updates {
            update.apply(material);
        }
        material.updated_at = Some(self.updated_at);
    }

    /// Names of every field this patch writes, including `updatedAt`.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths: Vec<&'static str> =
            self.updates.iter().map(FieldUpdate::field_name).collect();
        paths.push("updatedAt");
        paths
    }
}

/// Timestamps are read leniently: RFC 3339 strings, or `{seconds, nanoseconds}`
/// objects as produced by serializing a Firestore timestamp in a browser.
/// Anything else reads as absent.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(parse))
    }

    fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            Value::Object(map) => {
                let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
                let nanos = map
                    .get("nanoseconds")
                    .or_else(|| map.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                DateTime::from_timestamp(seconds, nanos as u32)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Material {
        Material::from_draft(
            MaterialId::new("m1"),
            &MaterialDraft::new(
                "Pipa Tembaga 1/2\"",
                "meter",
                Decimal::from(85000),
                Decimal::from(25),
                Decimal::from(15),
            ),
        )
    }

    #[test]
    fn test_material_json_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["realPrice"], json!(85000));
        assert_eq!(json["profitMargin"], json!(15));
        assert_eq!(json["id"], json!("m1"));
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_material_reads_loose_documents() {
        let material: Material = serde_json::from_value(json!({
            "name": "Freon R32",
            "unit": "kg",
            "realPrice": "120000",
            "markup": null,
            "createdAt": { "seconds": 1700000000, "nanoseconds": 0 },
            "updatedAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert!(material.id.is_none());
        assert_eq!(material.real_price, Decimal::from(120000));
        assert_eq!(material.markup, Decimal::ZERO);
        assert_eq!(material.profit_margin, Decimal::ZERO);
        assert_eq!(material.created_at.unwrap().timestamp(), 1_700_000_000);
        assert!(material.updated_at.is_some());
    }

    #[test]
    fn test_local_ids() {
        let id = MaterialId::local();
        assert!(id.is_local());
        assert!(!MaterialId::new("abc").is_local());
        assert_ne!(MaterialId::local(), id);
    }

    #[test]
    fn test_patch_applies_every_update() {
        let mut material = sample();
        let now = Utc::now();
        let patch = MaterialPatch::new(
            vec![FieldUpdate::Markup(Decimal::from(40)), FieldUpdate::Name("Pipa 3/4\"".into())],
            now,
        );
        patch.apply_to(&mut material);

        assert_eq!(material.markup, Decimal::from(40));
        assert_eq!(material.name, "Pipa 3/4\"");
        assert_eq!(material.updated_at, Some(now));
        assert_eq!(patch.field_paths(), vec!["markup", "name", "updatedAt"]);
    }
}
