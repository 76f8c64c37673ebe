//! Request validators shared across handlers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::errors::VaultError;

static WALLET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("wallet name regex"));

/// Validate a wallet name.
///
/// Rules:
/// - not empty, at most 64 characters
/// - letters, digits, underscores and hyphens only (this also rules out
///   path traversal and injection characters)
pub fn validate_wallet_name(name: &str) -> Result<(), VaultError> {
    if name.is_empty() {
        return Err(VaultError::InvalidInput("wallet name cannot be empty".to_string()));
    }
    if name.len() > 64 {
        return Err(VaultError::InvalidInput(
            "wallet name too long (max 64 characters)".to_string(),
        ));
    }
    if !WALLET_NAME_RE.is_match(name) {
        return Err(VaultError::InvalidInput(
            "wallet name must contain only letters, numbers, underscores, and hyphens".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["w1", "my-wallet", "my_wallet", "ABC123"] {
            assert!(validate_wallet_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        let too_long = "a".repeat(65);
        for name in ["", "../etc", "a/b", "a b", "name!", too_long.as_str()] {
            assert!(validate_wallet_name(name).is_err(), "{:?} should be invalid", name);
        }
    }
}
