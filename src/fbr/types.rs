use serde::{Deserialize, Serialize};
use std::fmt;

/// One selectable reference value (an HS code, a unit, a province).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
  pub key: String,
  pub description: String,
}

impl ReferenceEntry {
  pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      description: description.into(),
    }
  }
}

/// Reference tables served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ReferenceKind {
  /// Full HS classification code list
  HsCodes,
  /// Province codes
  Provinces,
  /// Complete unit-of-measure list
  Units,
  /// Valid units for a single HS code (looked up per key)
  Uom,
}

impl ReferenceKind {
  pub const ALL: [ReferenceKind; 4] = [
    ReferenceKind::HsCodes,
    ReferenceKind::Provinces,
    ReferenceKind::Units,
    ReferenceKind::Uom,
  ];

  /// Name used in storage keys and logs.
  pub fn slug(self) -> &'static str {
    match self {
      Self::HsCodes => "hs_codes",
      Self::Provinces => "provinces",
      Self::Units => "units",
      Self::Uom => "uom",
    }
  }

  /// Whether the kind is cached per lookup key rather than as one table.
  pub fn is_keyed(self) -> bool {
    matches!(self, Self::Uom)
  }
}

impl fmt::Display for ReferenceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

/// Gateway environment. Selects which credential is used.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Sandbox,
  Production,
}

impl Environment {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Sandbox => "sandbox",
      Self::Production => "production",
    }
  }
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies one cache slot: a whole table, or one key of a keyed kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
  pub kind: ReferenceKind,
  pub key: Option<String>,
}

impl SlotKey {
  pub fn table(kind: ReferenceKind) -> Self {
    Self { kind, key: None }
  }

  pub fn keyed(kind: ReferenceKind, key: impl Into<String>) -> Self {
    Self {
      kind,
      key: Some(key.into()),
    }
  }

  /// Storage key for the payload half of the record, e.g. `fbr_hs_codes_cache`
  /// or `fbr_uom_0101.2100_cache`.
  pub fn storage_key(&self, prefix: &str) -> String {
    match &self.key {
      Some(key) => format!("{}_{}_{}_cache", prefix, self.kind.slug(), key),
      None => format!("{}_{}_cache", prefix, self.kind.slug()),
    }
  }
}

impl fmt::Display for SlotKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.key {
      Some(key) => write!(f, "{}:{}", self.kind, key),
      None => write!(f, "{}", self.kind),
    }
  }
}
