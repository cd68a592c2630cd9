//! Validation helpers for DTOs.

use validator::ValidationError;

const PLAYER_ID_MAX_LENGTH: usize = 64;

/// Validate a player identity as handed over by the auth layer: non-empty,
/// bounded, and limited to URL-safe characters.
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new("player_id_empty"));
    }
    if id.len() > PLAYER_ID_MAX_LENGTH {
        return Err(ValidationError::new("player_id_too_long"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new("player_id_invalid_characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_url_safe_identities() {
        assert!(validate_player_id("player_01-abc").is_ok());
    }

    #[test]
    fn rejects_empty_overlong_and_exotic() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id(&"x".repeat(65)).is_err());
        assert!(validate_player_id("no spaces").is_err());
        assert!(validate_player_id("sémaphore").is_err());
    }
}
