//! Memcached key constraints
//!
//! Keys travel on the command line of the ASCII protocol, so they must be
//! free of whitespace and control characters and fit in 250 bytes.

use crate::error::KeyError;

/// Maximum key length in bytes (memcached spec)
pub const MAX_KEY_LENGTH: usize = 250;

/// Check a key against the ASCII-protocol constraints.
///
/// Rejects whitespace of any class and control characters, including the
/// C1 range (`is_control` covers 0x00-0x1F, 0x7F and 0x80-0x9F). Pure
/// function, no side effects.
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeyError::IllegalCharacter);
    }
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(KeyError::Length);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("valid_key").is_ok());
        assert!(validate_key("key-with-dashes").is_ok());
        assert!(validate_key("key:with:colons").is_ok());
        assert!(validate_key(&"a".repeat(250)).is_ok());
    }

    #[test]
    fn test_whitespace_rejected() {
        assert_eq!(
            validate_key("key with space"),
            Err(KeyError::IllegalCharacter)
        );
        assert_eq!(
            validate_key("key\twith\ttab"),
            Err(KeyError::IllegalCharacter)
        );
        assert_eq!(validate_key("key\r\n"), Err(KeyError::IllegalCharacter));
    }

    #[test]
    fn test_control_characters_rejected() {
        assert_eq!(validate_key("key\u{0007}"), Err(KeyError::IllegalCharacter));
        assert_eq!(validate_key("key\u{007f}"), Err(KeyError::IllegalCharacter));
        // C1 range
        assert_eq!(validate_key("key\u{0090}"), Err(KeyError::IllegalCharacter));
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(validate_key(""), Err(KeyError::Length));
        assert_eq!(validate_key(&"a".repeat(251)), Err(KeyError::Length));
        // byte length counts, not char count
        assert_eq!(validate_key(&"é".repeat(126)), Err(KeyError::Length));
    }
}
