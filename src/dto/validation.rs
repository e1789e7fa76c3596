//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::{dao::models::parse_date, state::input::MAX_ACTIVITY_ID_LEN};

/// Validates a strict `YYYY-MM-DD` calendar date.
///
/// # Examples
///
/// ```ignore
/// validate_date("2024-01-31") // Ok
/// validate_date("2024-02-30") // Err - not a calendar date
/// validate_date("2024-1-31")  // Err - not zero padded
/// ```
pub fn validate_date(raw: &str) -> Result<(), ValidationError> {
    if parse_date(raw).is_none() {
        let mut err = ValidationError::new("date_format");
        err.message = Some(format!("`{raw}` is not a YYYY-MM-DD date").into());
        return Err(err);
    }
    Ok(())
}

/// Validates an activity identifier: short, ASCII alphanumeric or `_`.
pub fn validate_activity_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_ACTIVITY_ID_LEN {
        let mut err = ValidationError::new("activity_id_length");
        err.message = Some(
            format!("Activity id must be 1 to {MAX_ACTIVITY_ID_LEN} characters (got {})", id.len())
                .into(),
        );
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        let mut err = ValidationError::new("activity_id_format");
        err.message = Some("Activity id must contain only ASCII letters, digits or `_`".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2024-01-31").is_ok());
        assert!(validate_date("2024-02-29").is_ok());
        assert!(validate_date("2023-02-29").is_err()); // not a leap year
        assert!(validate_date("2024-1-31").is_err());
        assert!(validate_date("").is_err());
    }

    #[test]
    fn test_validate_activity_id() {
        assert!(validate_activity_id("steps").is_ok());
        assert!(validate_activity_id("exercise_quantity").is_ok());
        assert!(validate_activity_id("").is_err());
        assert!(validate_activity_id("a::b").is_err());
        assert!(validate_activity_id(&"x".repeat(33)).is_err());
    }
}
