//! Compiled-in reference data served when the gateway cannot be reached.

use super::types::{ReferenceEntry, ReferenceKind};

const HS_CODES: &[(&str, &str)] = &[
  ("0101.2100", "Pure-bred breeding horses"),
  ("0201.1000", "Carcasses and half-carcasses of bovine animals, fresh or chilled"),
  ("0401.1000", "Milk and cream, not concentrated, fat content not exceeding 1%"),
  ("1001.1100", "Durum wheat, seed"),
  ("1001.9900", "Other wheat and meslin"),
  ("1006.3010", "Basmati rice, semi-milled or wholly milled"),
  ("1701.9910", "Refined cane or beet sugar"),
  ("2402.2000", "Cigarettes containing tobacco"),
  ("2523.2900", "Portland cement, other than white"),
  ("2710.1210", "Motor spirit (petrol)"),
  ("2710.1931", "High speed diesel oil"),
  ("3004.9099", "Other medicaments, put up in measured doses"),
  ("3917.2100", "Tubes, pipes and hoses of polymers of ethylene"),
  ("5205.1100", "Cotton yarn, single, of uncombed fibres"),
  ("5208.1100", "Woven fabrics of cotton, plain weave, unbleached"),
  ("7214.2000", "Bars and rods of iron or non-alloy steel, deformed"),
  ("8415.1010", "Air conditioning machines, window or wall types"),
  ("8432.1010", "Ploughs"),
  ("8517.1300", "Smartphones"),
  ("8703.2313", "Motor cars, cylinder capacity 1300cc to 1500cc"),
  ("9801.0000", "Services"),
];

const PROVINCES: &[(&str, &str)] = &[
  ("2", "BALOCHISTAN"),
  ("4", "AZAD JAMMU AND KASHMIR"),
  ("5", "CAPITAL TERRITORY"),
  ("6", "KHYBER PAKHTUNKHWA"),
  ("7", "PUNJAB"),
  ("8", "SINDH"),
  ("9", "GILGIT BALTISTAN"),
];

/// Units offered for any HS code without a curated list.
const DEFAULT_UNITS: &[&str] = &[
  "Numbers, pieces, units",
  "KG",
  "Liter",
  "Meter",
  "Square Metre",
  "Cubic Metre",
  "Metric Tonne",
  "Dozen",
  "Pair",
  "Gram",
  "Carat",
  "Thousand Unit",
  "KWH",
  "MMBTU",
];

const PIECES: &[&str] = &["Numbers, pieces, units"];
const WEIGHT: &[&str] = &["KG", "Metric Tonne"];
const VOLUME: &[&str] = &["Liter"];
const YARN: &[&str] = &["KG"];
const FABRIC: &[&str] = &["Square Metre", "Meter", "KG"];
const CIGARETTES: &[&str] = &["Thousand Unit"];

/// HS code -> the units the gateway accepts for it.
const UNITS_BY_HS_CODE: &[(&str, &[&str])] = &[
  ("0101.2100", PIECES),
  ("1001.1100", WEIGHT),
  ("1006.3010", WEIGHT),
  ("1701.9910", WEIGHT),
  ("2402.2000", CIGARETTES),
  ("2523.2900", WEIGHT),
  ("2710.1210", VOLUME),
  ("2710.1931", VOLUME),
  ("3004.9099", PIECES),
  ("5205.1100", YARN),
  ("5208.1100", FABRIC),
  ("7214.2000", WEIGHT),
  ("8415.1010", PIECES),
  ("8517.1300", PIECES),
  ("8703.2313", PIECES),
];

/// Reference data available with zero network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackTable;

impl FallbackTable {
  pub fn new() -> Self {
    Self
  }

  /// Whole-table fallback for `kind`. For keyed kinds this is the default bucket.
  pub fn table(&self, kind: ReferenceKind) -> Vec<ReferenceEntry> {
    match kind {
      ReferenceKind::HsCodes => pairs(HS_CODES),
      ReferenceKind::Provinces => pairs(PROVINCES),
      ReferenceKind::Units | ReferenceKind::Uom => units(DEFAULT_UNITS),
    }
  }

  /// Fallback for one key of a keyed kind: the curated list when the key is
  /// known, otherwise the default bucket. Never empty.
  pub fn for_key(&self, kind: ReferenceKind, key: &str) -> Vec<ReferenceEntry> {
    if kind == ReferenceKind::Uom {
      let key = key.trim();
      if let Some((_, curated)) = UNITS_BY_HS_CODE.iter().find(|(code, _)| *code == key) {
        return units(curated);
      }
    }
    self.table(kind)
  }
}

fn pairs(rows: &[(&str, &str)]) -> Vec<ReferenceEntry> {
  rows
    .iter()
    .map(|(key, description)| ReferenceEntry::new(*key, *description))
    .collect()
}

// Offline units have no gateway id; the description doubles as the key since
// invoices carry the unit by name.
fn units(names: &[&str]) -> Vec<ReferenceEntry> {
  names
    .iter()
    .map(|name| ReferenceEntry::new(*name, *name))
    .collect()
}
