//! # Export and Import
//!
//! The transfer file is a pretty-printed JSON document:
//!
//! ```text
//! {
//!   "version": "1.0.0",
//!   "exportDate": "2024-05-01T10:00:00+00:00",
//!   "materials": [ { "name": ..., "unit": ..., "realPrice": ..., ... } ],
//!   "settings": { "defaultMarkup": 30, "profitMargin": 15 },
//!   "totals": { "count": 4, "totalRealPrice": ..., ... }
//! }
//! ```
//!
//! Export is a pure read of the collection. Import only parses and checks the
//! document here; clearing the collection and creating the new entries is done
//! by the command layer. Ids in an imported file are ignored.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::{PriceError, PriceResult};
use crate::local::write_atomic;
use crate::material::{Material, MaterialDraft};
use crate::pricing::Totals;
use crate::schema::{validate_version, SCHEMA_VERSION};
use crate::settings::PricingSettings;
use crate::validation::{validate_name, validate_percentage, validate_real_price, validate_unit};

/// Prefix of export file names
pub const EXPORT_FILE_PREFIX: &str = "pricelist";

/// A complete export of the price list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub materials: Vec<Material>,
    pub settings: PricingSettings,
    pub totals: Totals,
}

/// Snapshot the collection and settings for export.
pub fn build_export(
    materials: &[Material],
    settings: &PricingSettings,
    now: DateTime<Utc>,
) -> ExportDocument {
    ExportDocument {
        version: SCHEMA_VERSION.to_string(),
        export_date: now,
        materials: materials.to_vec(),
        settings: *settings,
        totals: Totals::of(materials),
    }
}

/// Serialize an export document as pretty-printed JSON.
pub fn export_json(document: &ExportDocument) -> PriceResult<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Default file name for an export made at `now`: `pricelist-YYYY-MM-DD.json`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("{}-{}.json", EXPORT_FILE_PREFIX, now.format("%Y-%m-%d"))
}

/// Write an export document to disk atomically.
pub fn write_export(document: &ExportDocument, path: &Path) -> PriceResult<()> {
    let json = export_json(document)?;
    write_atomic(path, json.as_bytes())
}

/// The checked contents of an import file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBundle {
    /// One draft per record, in file order, without ids
    pub drafts: Vec<MaterialDraft>,
    /// Settings carried by the file, if any
    pub settings: Option<PricingSettings>,
    pub version: Option<String>,
}

impl ImportBundle {
    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

/// Parse and check an import document.
///
/// The whole file is rejected on the first bad record; nothing is ever
/// imported partially.
pub fn parse_import(text: &str) -> PriceResult<ImportBundle> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| PriceError::format(format!("File is not valid JSON: {}", e)))?;

    let Value::Object(root) = root else {
        return Err(PriceError::format("Import file must be a JSON object"));
    };

    let version = match root.get("version") {
        Some(Value::String(version)) => {
            validate_version(version)?;
            Some(version.clone())
        }
        Some(Value::Null) | None => None,
        Some(other) => return Err(PriceError::format(format!("Unreadable version: {}", other))),
    };

    let records = match root.get("materials") {
        Some(Value::Array(records)) => records,
        Some(_) => return Err(PriceError::format("'materials' must be an array")),
        None => return Err(PriceError::format("File has no 'materials' list")),
    };

    let drafts = records
        .iter()
        .enumerate()
        .map(|(index, record)| parse_record(index, record))
        .collect::<PriceResult<Vec<_>>>()?;

    let settings = match root.get("settings") {
        Some(value @ Value::Object(_)) => {
            match serde_json::from_value::<PricingSettings>(value.clone()) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!("ignoring unreadable settings in import file: {}", e);
                    None
                }
            }
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            warn!("ignoring non-object settings in import file");
            None
        }
    };

    Ok(ImportBundle {
        drafts,
        settings,
        version,
    })
}

/// Read and parse an import file from disk.
pub fn read_import(path: &Path) -> PriceResult<ImportBundle> {
    let text = fs::read_to_string(path)
        .map_err(|e| {
            PriceError::storage("read import file", path.display().to_string(), e.to_string())
        })?;
    parse_import(&text)
}

/// Records go through the same rules as the add form; a failure names the
/// record and the rule it broke.
fn parse_record(index: usize, record: &Value) -> PriceResult<MaterialDraft> {
    let bad = |reason: &str| PriceError::format(format!("Material #{}: {}", index + 1, reason));
    let rule = |e: PriceError| match e {
        PriceError::Validation { field, reason, .. } => bad(&format!("{} - {}", field, reason)),
        other => bad(&other.to_string()),
    };

    if !record.is_object() {
        return Err(bad("record must be an object"));
    }
    let Some(Value::String(name)) = record.get("name") else {
        return Err(bad("name must be a string"));
    };
    let Some(Value::String(unit)) = record.get("unit") else {
        return Err(bad("unit must be a string"));
    };
    let name = validate_name(name).map_err(rule)?;
    let unit = validate_unit(unit).map_err(rule)?;

    let material: Material =
        serde_json::from_value(record.clone()).map_err(|e| bad(&e.to_string()))?;
    let mut draft = material.to_draft();
    draft.name = name;
    draft.unit = unit;
    draft.real_price = validate_real_price(&material.real_price.to_string()).map_err(rule)?;
    draft.markup = validate_percentage("markup", &material.markup.to_string()).map_err(rule)?;
    draft.profit_margin =
        validate_percentage("profitMargin", &material.profit_margin.to_string()).map_err(rule)?;
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialId;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::env::temp_dir;

    fn material(id: &str, name: &str, real: i64, markup: i64, margin: i64) -> Material {
        Material::from_draft(
            MaterialId::new(id),
            &MaterialDraft::new(
                name,
                "meter",
                Decimal::from(real),
                Decimal::from(markup),
                Decimal::from(margin),
            ),
        )
    }

    #[test]
    fn test_export_document_shape() {
        let now = Utc::now();
        let materials = vec![material("a", "Pipa", 85000, 25, 15)];
        let doc = build_export(&materials, &PricingSettings::default(), now);
        let json: Value = serde_json::from_str(&export_json(&doc).unwrap()).unwrap();

        assert_eq!(json["version"], json!(SCHEMA_VERSION));
        assert!(json["exportDate"].is_string());
        assert_eq!(json["materials"][0]["realPrice"], json!(85000));
        assert_eq!(json["settings"], json!({ "defaultMarkup": 30, "profitMargin": 15 }));
        assert_eq!(json["totals"]["count"], json!(1));
        assert_eq!(json["totals"]["totalFinalPrice"], json!(122187.5));
    }

    #[test]
    fn test_export_file_name() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T23:10:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(export_file_name(now), "pricelist-2024-05-01.json");
    }

    #[test]
    fn test_export_then_import_keeps_tuples() {
        let materials = vec![
            material("a", "AC Split 1 PK", 2_500_000, 30, 15),
            material("b", "Freon R32", 120_000, 35, 15),
        ];
        let settings = PricingSettings::new(Decimal::from(40), Decimal::from(10));
        let text = export_json(&build_export(&materials, &settings, Utc::now())).unwrap();

        let bundle = parse_import(&text).unwrap();
        assert_eq!(bundle.settings, Some(settings));
        let tuples: Vec<_> = bundle
            .drafts
            .iter()
            .map(|d| (d.name.clone(), d.unit.clone(), d.real_price, d.markup, d.profit_margin))
            .collect();
        let expected: Vec<_> = materials
            .iter()
            .map(|m| (m.name.clone(), m.unit.clone(), m.real_price, m.markup, m.profit_margin))
            .collect();
        assert_eq!(tuples, expected);
    }

    #[test]
    fn test_materials_must_be_an_array() {
        let err = parse_import(r#"{ "materials": { "name": "Pipa" } }"#).unwrap_err();
        assert!(matches!(err, PriceError::Format { .. }));

        let err = parse_import(r#"{ "settings": {} }"#).unwrap_err();
        assert!(matches!(err, PriceError::Format { .. }));

        let err = parse_import("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, PriceError::Format { .. }));

        let err = parse_import("not json").unwrap_err();
        assert!(matches!(err, PriceError::Format { .. }));
    }

    #[test]
    fn test_bad_record_rejects_whole_file() {
        let text = json!({
            "materials": [
                {
                    "name": "Pipa",
                    "unit": "meter",
                    "realPrice": 85000,
                    "markup": 25,
                    "profitMargin": 15
                },
                { "name": "Broken", "unit": "kg", "realPrice": 0 }
            ]
        })
        .to_string();
        let err = parse_import(&text).unwrap_err();
        assert!(err.to_string().contains("Material #2"));

        let text = json!({ "materials": ["Pipa"] }).to_string();
        assert!(matches!(parse_import(&text), Err(PriceError::Format { .. })));
    }

    #[test]
    fn test_records_follow_add_form_rules() {
        let record = |overrides: Value| {
            let mut base = json!({
                "name": "Pipa",
                "unit": "meter",
                "realPrice": 85000,
                "markup": 25,
                "profitMargin": 15
            });
            if let (Value::Object(base), Value::Object(extra)) = (&mut base, overrides) {
                base.extend(extra);
            }
            json!({ "materials": [base] }).to_string()
        };

        let err = parse_import(&record(json!({ "unit": "" }))).unwrap_err();
        assert!(matches!(err, PriceError::Format { .. }));
        assert!(err.to_string().contains("Material #1: unit"));

        let err = parse_import(&record(json!({ "realPrice": 5e15 }))).unwrap_err();
        assert!(err.to_string().contains("realPrice"));

        let err = parse_import(&record(json!({ "markup": 99999 }))).unwrap_err();
        assert!(err.to_string().contains("markup"));

        let err = parse_import(&record(json!({ "profitMargin": -1 }))).unwrap_err();
        assert!(err.to_string().contains("profitMargin"));

        let err = parse_import(&record(json!({ "name": "X" }))).unwrap_err();
        assert!(err.to_string().contains("name"));

        let padded = record(json!({ "name": "  Pipa AC  ", "unit": " meter " }));
        let bundle = parse_import(&padded).unwrap();
        assert_eq!(bundle.drafts[0].name, "Pipa AC");
        assert_eq!(bundle.drafts[0].unit, "meter");
    }

    #[test]
    fn test_browser_export_is_accepted() {
        // Settings stored as input text, ids and Firestore timestamps in records
        let text = json!({
            "materials": [{
                "id": "abc123",
                "name": "Kabel NYM 3x2.5",
                "unit": "meter",
                "realPrice": 15000,
                "markup": 20,
                "profitMargin": 15,
                "createdAt": { "seconds": 1700000000, "nanoseconds": 0 }
            }],
            "settings": { "defaultMarkup": "25", "profitMargin": "" },
            "exportDate": "2024-05-01T10:00:00.000Z"
        })
        .to_string();

        let bundle = parse_import(&text).unwrap();
        assert_eq!(bundle.len(), 1);
        assert!(bundle.version.is_none());
        assert_eq!(bundle.drafts[0].real_price, Decimal::from(15000));
        assert!(bundle.drafts[0].created_at.is_some());
        assert_eq!(
            bundle.settings,
            Some(PricingSettings::new(Decimal::from(25), Decimal::from(15)))
        );
    }

    #[test]
    fn test_newer_major_version_is_rejected() {
        let text = json!({ "version": "2.0.0", "materials": [] }).to_string();
        assert!(matches!(parse_import(&text), Err(PriceError::VersionMismatch { .. })));
    }

    #[test]
    fn test_write_and_read_file() {
        let path = temp_dir().join(format!("pricelist_transfer_test_{}.json", std::process::id()));
        let materials = [material("a", "Pipa", 85000, 25, 15)];
        let doc = build_export(&materials, &PricingSettings::default(), Utc::now());

        write_export(&doc, &path).unwrap();
        let bundle = read_import(&path).unwrap();
        assert_eq!(bundle.drafts.len(), 1);
        assert_eq!(bundle.version.as_deref(), Some(SCHEMA_VERSION));

        let _ = fs::remove_file(&path);
        assert!(matches!(read_import(&path), Err(PriceError::Storage { .. })));
    }
}
