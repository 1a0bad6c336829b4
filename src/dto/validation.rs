//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum accepted length for a room identifier.
const ROOM_ID_MAX_LENGTH: usize = 64;

/// Validates that a room ID is 1 to 64 lowercase alphanumeric characters or
/// dashes, with no leading or trailing dash.
///
/// # Examples
///
/// ```ignore
/// validate_room_id("friday-night")  // Ok
/// validate_room_id("Friday")        // Err - uppercase
/// validate_room_id("-party")        // Err - leading dash
/// ```
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > ROOM_ID_MAX_LENGTH {
        let mut err = ValidationError::new("room_id_length");
        err.message = Some(
            format!(
                "Room ID must be 1 to {ROOM_ID_MAX_LENGTH} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        let mut err = ValidationError::new("room_id_format");
        err.message =
            Some("Room ID must contain only lowercase alphanumeric characters or dashes".into());
        return Err(err);
    }

    if id.starts_with('-') || id.ends_with('-') {
        let mut err = ValidationError::new("room_id_format");
        err.message = Some("Room ID must not start or end with a dash".into());
        return Err(err);
    }

    Ok(())
}
