//! Sanitising of user supplied names, scores and dates.
//!
//! Everything here runs before a mutation is built, so rejected input never
//! reaches a remote store.

use thiserror::Error;
use time::Date;

use crate::{dao::models::parse_date, state::catalog::ActivityCatalog};

/// Longest accepted player name, after trimming.
pub const MAX_NAME_LEN: usize = 12;
/// Longest accepted activity id.
pub const MAX_ACTIVITY_ID_LEN: usize = 32;
/// Characters the realtime tree refuses in keys.
const RESERVED_KEY_CHARS: [char; 6] = ['/', '.', '$', '#', '[', ']'];

/// Reason a piece of user input was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("player name is empty")]
    EmptyName,
    #[error("player name is longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("player name may only contain letters and digits (found `{found}`)")]
    InvalidNameCharacter { found: char },
    #[error("`{raw}` is not a number")]
    NotANumber { raw: String },
    #[error("score must be a finite, non-negative number")]
    OutOfDomain,
    #[error("score for `{activity}` must not exceed {max}")]
    AboveMaximum { activity: String, max: f64 },
    #[error("`{raw}` is not a YYYY-MM-DD date")]
    InvalidDate { raw: String },
    #[error("activity id `{raw}` must be 1-32 letters, digits or underscores")]
    InvalidActivityId { raw: String },
}

/// Trim and upper-case `raw`, refusing anything that is not a short alphanumeric name.
pub fn sanitize_player_name(raw: &str) -> Result<String, InputError> {
    let name = raw.trim().to_uppercase();
    if name.is_empty() {
        return Err(InputError::EmptyName);
    }
    if let Some(found) = name
        .chars()
        .find(|ch| RESERVED_KEY_CHARS.contains(ch) || !ch.is_ascii_alphanumeric())
    {
        return Err(InputError::InvalidNameCharacter { found });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(InputError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(name)
}

/// Parse free-form score input; blank input means "clear the value".
pub fn parse_score(
    raw: &str,
    activity: &str,
    catalog: &ActivityCatalog,
) -> Result<Option<f64>, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = trimmed.parse::<f64>().map_err(|_| InputError::NotANumber {
        raw: trimmed.to_owned(),
    })?;
    validate_score(value, activity, catalog).map(Some)
}

/// Check a numeric score against the activity bound.
pub fn validate_score(
    value: f64,
    activity: &str,
    catalog: &ActivityCatalog,
) -> Result<f64, InputError> {
    if !value.is_finite() || value < 0.0 {
        return Err(InputError::OutOfDomain);
    }
    let max = catalog.bound(activity);
    if value > max {
        return Err(InputError::AboveMaximum {
            activity: activity.to_owned(),
            max,
        });
    }
    Ok(value)
}

/// Accept an activity id usable as one segment of a score key.
///
/// Unknown ids are fine (they fall back to the default bound) but separators
/// and reserved key characters would corrupt the `date::player::activity` key.
pub fn parse_activity_id(raw: &str) -> Result<String, InputError> {
    let id = raw.trim();
    let well_formed = !id.is_empty()
        && id.len() <= MAX_ACTIVITY_ID_LEN
        && id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !well_formed {
        return Err(InputError::InvalidActivityId {
            raw: raw.to_owned(),
        });
    }
    Ok(id.to_owned())
}

/// Parse a strict `YYYY-MM-DD` score date.
pub fn parse_score_date(raw: &str) -> Result<Date, InputError> {
    parse_date(raw.trim()).ok_or_else(|| InputError::InvalidDate {
        raw: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_upper_cased() {
        assert_eq!(sanitize_player_name("  ab12 ").unwrap(), "AB12");
        assert_eq!(sanitize_player_name("   "), Err(InputError::EmptyName));
        assert_eq!(
            sanitize_player_name("ABCDEFGHIJKLM"),
            Err(InputError::NameTooLong { max: MAX_NAME_LEN })
        );
        assert_eq!(
            sanitize_player_name("a.b"),
            Err(InputError::InvalidNameCharacter { found: '.' })
        );
        assert!(sanitize_player_name("A B").is_err());
        assert!(sanitize_player_name("ÉCLAIR").is_err());
    }

    #[test]
    fn score_bounds_follow_the_activity() {
        let catalog = ActivityCatalog::default();
        assert_eq!(parse_score("24", "sleep", &catalog), Ok(Some(24.0)));
        assert!(matches!(
            parse_score("24.5", "sleep", &catalog),
            Err(InputError::AboveMaximum { .. })
        ));
        assert_eq!(parse_score(" 200000 ", "yoga", &catalog), Ok(Some(200_000.0)));
        assert!(parse_score("200001", "yoga", &catalog).is_err());
        assert_eq!(parse_score("-1", "steps", &catalog), Err(InputError::OutOfDomain));
        assert_eq!(parse_score("NaN", "steps", &catalog), Err(InputError::OutOfDomain));
        assert!(matches!(
            parse_score("lots", "steps", &catalog),
            Err(InputError::NotANumber { .. })
        ));
    }

    #[test]
    fn blank_score_means_clear() {
        let catalog = ActivityCatalog::default();
        assert_eq!(parse_score("   ", "steps", &catalog), Ok(None));
    }

    #[test]
    fn activity_ids_must_fit_in_one_key_segment() {
        assert_eq!(parse_activity_id(" steps ").unwrap(), "steps");
        assert_eq!(parse_activity_id("exercise_Quantity2").unwrap(), "exercise_Quantity2");
        for raw in ["", "  ", "x::y", "a/b", "a.b", "$x", "a b", "sömn"] {
            assert_eq!(
                parse_activity_id(raw),
                Err(InputError::InvalidActivityId { raw: raw.into() })
            );
        }
        assert!(parse_activity_id(&"a".repeat(MAX_ACTIVITY_ID_LEN)).is_ok());
        assert!(parse_activity_id(&"a".repeat(MAX_ACTIVITY_ID_LEN + 1)).is_err());
    }

    #[test]
    fn dates_must_be_strict() {
        assert!(parse_score_date("2024-03-04").is_ok());
        assert!(parse_score_date("2024-3-4").is_err());
        assert!(parse_score_date("yesterday").is_err());
    }
}
