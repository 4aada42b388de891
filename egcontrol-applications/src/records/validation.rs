//! Input validation for record creation

use super::types::NewObjectRecord;
use crate::{ApplicationError, ApplicationResult};

/// Length of an EG code
pub const EG_CODE_LEN: usize = 18;
/// Maximum length of an object code
pub const OBJECT_CODE_MAX_LEN: usize = 18;
/// Maximum number of digits in a trip number
pub const TRIP_NUMBER_MAX_LEN: usize = 7;

/// Keep only ASCII digits, truncated to `max_len`
///
/// Input layers use this to clean keystrokes before they reach validation.
pub fn normalize_digits(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(char::is_ascii_digit)
        .take(max_len)
        .collect()
}

/// An EG code must be exactly 18 ASCII digits; nothing is stripped
pub fn validate_eg_code(code: &str) -> ApplicationResult<&str> {
    if code.len() != EG_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApplicationError::validation(
            "code",
            format!("The EG code must have exactly {} digits", EG_CODE_LEN),
        ));
    }
    Ok(code)
}

/// Normalize and check an object form, returning the object code and trip number
pub fn validate_object(input: &NewObjectRecord) -> ApplicationResult<(String, u32)> {
    let object_code = normalize_digits(&input.object_code, OBJECT_CODE_MAX_LEN);
    if object_code.is_empty() {
        return Err(ApplicationError::validation(
            "object_code",
            "The object code is required",
        ));
    }

    let trip_digits: String = input
        .trip_number
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if trip_digits.is_empty() {
        return Err(ApplicationError::validation(
            "trip_number",
            "The trip number is required",
        ));
    }
    if trip_digits.len() > TRIP_NUMBER_MAX_LEN {
        return Err(ApplicationError::validation(
            "trip_number",
            format!("The trip number can have at most {} digits", TRIP_NUMBER_MAX_LEN),
        ));
    }

    let trip_number = trip_digits.parse::<u32>().map_err(|_| {
        ApplicationError::validation("trip_number", "The trip number is not a number")
    })?;

    Ok((object_code, trip_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_digits() {
        assert_eq!(normalize_digits("12-34 ab56", 18), "123456");
        assert_eq!(normalize_digits("1234567890", 4), "1234");
        assert_eq!(normalize_digits("abc", 5), "");
        assert_eq!(normalize_digits("١٢٣", 5), "");
    }

    #[test]
    fn test_eg_code_length() {
        assert!(validate_eg_code("123456789012345678").is_ok());
        assert!(validate_eg_code("12345678901234567").is_err());
        assert!(validate_eg_code("1234567890123456789").is_err());
        assert!(validate_eg_code("").is_err());
    }

    #[test]
    fn test_eg_code_is_not_normalized() {
        assert!(validate_eg_code("12345678901234567a").is_err());
        assert!(validate_eg_code(" 123456789012345678").is_err());
        assert!(validate_eg_code("123456789-012345678").is_err());
    }

    #[test]
    fn test_object_normalization() {
        let (code, trip) =
            validate_object(&NewObjectRecord::new("AB-0012345678901234567899", " 00412 ")).unwrap();
        assert_eq!(code, "001234567890123456");
        assert_eq!(trip, 412);
    }

    #[test]
    fn test_object_requires_both_fields() {
        let missing_code = validate_object(&NewObjectRecord::new("--", "12"));
        assert!(matches!(
            missing_code,
            Err(ApplicationError::Validation { ref field, .. }) if field == "object_code"
        ));

        let missing_trip = validate_object(&NewObjectRecord::new("12", ""));
        assert!(matches!(
            missing_trip,
            Err(ApplicationError::Validation { ref field, .. }) if field == "trip_number"
        ));

        assert!(validate_object(&NewObjectRecord::new("12", "12345678")).is_err());
        assert!(validate_object(&NewObjectRecord::new("12", "9999999")).is_ok());
    }
}
