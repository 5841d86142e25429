//! Invoice business rules that affect reference-data lookups.

use crate::fbr::types::ReferenceEntry;

pub const BILL_OF_LADING: &str = "Bill of lading";

/// Rates quoted per bill of lading (e.g. `"1.00/bill"`) are charged per
/// document, so the only valid unit is the bill itself.
pub fn is_bill_of_lading_rate(rate: &str) -> bool {
  rate.contains("/bill")
}

/// The single unit offered for bill-of-lading rates.
pub fn bill_of_lading_entry() -> ReferenceEntry {
  ReferenceEntry::new(BILL_OF_LADING, BILL_OF_LADING)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bill_of_lading_rates() {
    assert!(is_bill_of_lading_rate("1.00/bill"));
    assert!(is_bill_of_lading_rate("Rs.50/bill of lading"));
    assert!(!is_bill_of_lading_rate("18%"));
    assert!(!is_bill_of_lading_rate("Rs.1.00/Bill"));
    assert!(!is_bill_of_lading_rate(""));
  }
}
