use chrono::NaiveDate;

use crate::error::ValidationError;

/// Keep only the ASCII digits of a phone number as typed.
pub(crate) fn normalize_phone(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
}

/// Local mobile numbering: exactly 10 digits, first digit 6-9.
pub fn is_valid_mobile(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && matches!(bytes[0], b'6'..=b'9')
        && bytes.iter().all(|b| b.is_ascii_digit())
}

pub(crate) fn require_mobile(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if is_valid_mobile(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(ValidationError::InvalidMobile)
    }
}

/// Trimmed value, or `None` when blank.
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_accepts_ten_digits_starting_six_to_nine() {
        for ok in ["6000000000", "7894561230", "8123456789", "9951062449"] {
            assert!(is_valid_mobile(ok), "{ok} should be valid");
        }
    }

    #[test]
    fn mobile_rejects_everything_else() {
        for bad in [
            "",
            "5123456789",
            "0123456789",
            "995106244",
            "99510624490",
            "99510 62449",
            "+919951062449",
            "99510624a9",
            "９９５１０６２４４９",
        ] {
            assert!(!is_valid_mobile(bad), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn require_mobile_trims_surrounding_whitespace() {
        assert_eq!(require_mobile(" 9951062449 ").unwrap(), "9951062449");
        assert_eq!(require_mobile("12"), Err(ValidationError::InvalidMobile));
    }

    #[test]
    fn normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("+91 99510-62449"), "919951062449");
    }

    #[test]
    fn helpers_for_blank_and_dates() {
        assert_eq!(non_blank("  "), None);
        assert_eq!(non_blank(" x ").as_deref(), Some("x"));
        assert!(parse_date("2026-10-15").is_some());
        assert!(parse_date("15/10/2026").is_none());
    }
}
