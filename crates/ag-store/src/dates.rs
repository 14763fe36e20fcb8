//! Date normalization from the model binary's unit notation.

use chrono::NaiveDate;
use tracing::warn;

/// The unit string the binary writes once dates are in SQL form.
pub const ISO_DATE_UNIT: &str = "(yyyy-mm-dd)";

/// Translate a date unit string like `(dd/mm/yyyy)` into a chrono format.
pub fn unit_to_format(unit: &str) -> String {
    unit.trim_start_matches('(')
        .trim_end_matches(')')
        .replace("yyyy", "%Y")
        .replace("mm", "%m")
        .replace("dd", "%d")
}

/// Convert one date value to ISO `YYYY-MM-DD`. Unparseable values are kept
/// verbatim with a warning; downstream treats them as missing.
pub fn to_iso_date(value: &str, format: &str) -> String {
    match NaiveDate::parse_from_str(value, format) {
        Ok(date) => date.format("%Y-%m-%d").to_string(),
        Err(_) => {
            warn!("could not parse date '{}' with format '{}'", value, format);
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_unit_notation() {
        assert_eq!(unit_to_format("(dd/mm/yyyy)"), "%d/%m/%Y");
        assert_eq!(unit_to_format("(mm/dd/yyyy)"), "%m/%d/%Y");
    }

    #[test]
    fn converts_to_iso() {
        assert_eq!(to_iso_date("25/03/2001", "%d/%m/%Y"), "2001-03-25");
    }

    #[test]
    fn keeps_unparseable_values() {
        assert_eq!(to_iso_date("garbage", "%d/%m/%Y"), "garbage");
    }
}
