//! Serde-deserializable types matching gateway reference-data responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping [`ReferenceEntry`] focused on what the forms need.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::error::FetchError;
use super::types::{ReferenceEntry, ReferenceKind};

/// Gateway ids arrive as numbers on some endpoints and strings on others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number, found {}",
      other
    ))),
  }
}

// ============================================================================
// Item description codes (HS codes)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiHsCode {
  #[serde(rename = "hS_CODE", alias = "hs_code", alias = "hsCode")]
  pub code: String,
  #[serde(default)]
  pub description: String,
}

impl From<ApiHsCode> for ReferenceEntry {
  fn from(api: ApiHsCode) -> Self {
    ReferenceEntry::new(api.code.trim(), api.description.trim())
  }
}

// ============================================================================
// Provinces
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProvince {
  #[serde(rename = "stateProvinceCode", deserialize_with = "string_or_number")]
  pub code: String,
  #[serde(rename = "stateProvinceDesc", default)]
  pub description: String,
}

impl From<ApiProvince> for ReferenceEntry {
  fn from(api: ApiProvince) -> Self {
    ReferenceEntry::new(api.code, api.description.trim())
  }
}

// ============================================================================
// Units of measure (full list and per HS code)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUnit {
  #[serde(
    rename = "uoM_ID",
    alias = "uom_id",
    alias = "uomId",
    deserialize_with = "string_or_number"
  )]
  pub id: String,
  #[serde(default)]
  pub description: String,
}

impl From<ApiUnit> for ReferenceEntry {
  fn from(api: ApiUnit) -> Self {
    ReferenceEntry::new(api.id, api.description.trim())
  }
}

/// Parse a response body for `kind` into entries.
///
/// The body must be a non-empty JSON array of the kind's shape; anything else
/// is a [`FetchError::MalformedResponse`].
pub fn parse_entries(kind: ReferenceKind, body: &str) -> Result<Vec<ReferenceEntry>, FetchError> {
  let value: Value = serde_json::from_str(body)
    .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {}", e)))?;

  let items = match value {
    Value::Array(items) => items,
    other => {
      return Err(FetchError::MalformedResponse(format!(
        "expected a JSON array, found {}",
        json_type(&other)
      )))
    }
  };

  if items.is_empty() {
    return Err(FetchError::MalformedResponse(format!(
      "empty {} list",
      kind
    )));
  }

  let items = Value::Array(items);
  let entries = match kind {
    ReferenceKind::HsCodes => convert::<ApiHsCode>(items),
    ReferenceKind::Provinces => convert::<ApiProvince>(items),
    ReferenceKind::Units | ReferenceKind::Uom => convert::<ApiUnit>(items),
  }
  .map_err(|e| FetchError::MalformedResponse(format!("unexpected {} shape: {}", kind, e)))?;

  Ok(entries)
}

fn convert<T>(items: Value) -> serde_json::Result<Vec<ReferenceEntry>>
where
  T: serde::de::DeserializeOwned + Into<ReferenceEntry>,
{
  let parsed: Vec<T> = serde_json::from_value(items)?;
  Ok(parsed.into_iter().map(Into::into).collect())
}

fn json_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_hs_codes() {
    let body = r#"[
      {"hS_CODE": "0101.2100", "description": "Pure-bred breeding horses "},
      {"hS_CODE": "8432.1010", "description": "Ploughs"}
    ]"#;

    let entries = parse_entries(ReferenceKind::HsCodes, body).unwrap();
    assert_eq!(
      entries,
      vec![
        ReferenceEntry::new("0101.2100", "Pure-bred breeding horses"),
        ReferenceEntry::new("8432.1010", "Ploughs"),
      ]
    );
  }

  #[test]
  fn test_parse_units_with_numeric_ids() {
    let body = r#"[{"uoM_ID": 13, "description": "KG"}, {"uoM_ID": "77", "description": "Square Metre"}]"#;

    let entries = parse_entries(ReferenceKind::Uom, body).unwrap();
    assert_eq!(entries[0], ReferenceEntry::new("13", "KG"));
    assert_eq!(entries[1], ReferenceEntry::new("77", "Square Metre"));
  }

  #[test]
  fn test_parse_provinces() {
    let body = r#"[{"stateProvinceCode": 7, "stateProvinceDesc": "PUNJAB"}]"#;

    let entries = parse_entries(ReferenceKind::Provinces, body).unwrap();
    assert_eq!(entries, vec![ReferenceEntry::new("7", "PUNJAB")]);
  }

  #[test]
  fn test_non_array_body_is_malformed() {
    let err = parse_entries(ReferenceKind::HsCodes, r#"{"error": "unauthorized"}"#).unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(msg) if msg.contains("an object")));
  }

  #[test]
  fn test_empty_list_is_malformed() {
    let err = parse_entries(ReferenceKind::Uom, "[]").unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
  }

  #[test]
  fn test_wrong_shape_is_malformed() {
    let err = parse_entries(ReferenceKind::Uom, r#"[{"code": "x"}]"#).unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));

    let err = parse_entries(ReferenceKind::HsCodes, "<html>").unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
  }
}
