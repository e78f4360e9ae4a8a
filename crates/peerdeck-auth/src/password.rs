//! Password policy and bcrypt handling.

use bcrypt::{hash, verify};
use tracing::warn;

use crate::error::AuthError;

/// Minimum bcrypt cost accepted for real hashes.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Result of comparing a supplied password against the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    /// Password did not match.
    Mismatch,
    /// Password matched a proper bcrypt hash.
    Match,
    /// Password matched a plaintext credential that must now be migrated to
    /// a bcrypt hash.
    MatchNeedsMigration,
}

/// Whether a candidate password satisfies the strength policy: at least
/// eight characters with one letter, one digit, and one non-alphanumeric.
#[must_use]
pub fn password_meets_policy(candidate: &str) -> bool {
    candidate.len() >= 8
        && candidate.chars().any(|c| c.is_ascii_alphabetic())
        && candidate.chars().any(|c| c.is_ascii_digit())
        && candidate.chars().any(|c| !c.is_ascii_alphanumeric())
}

/// Hash a password with the configured cost.
///
/// # Errors
///
/// Returns [`AuthError::WeakPassword`] when the policy fails and a store
/// error when bcrypt itself fails.
pub fn hash_password(candidate: &str, cost: u32) -> Result<String, AuthError> {
    if !password_meets_policy(candidate) {
        return Err(AuthError::WeakPassword);
    }
    hash(candidate, cost.max(MIN_BCRYPT_COST))
        .map_err(|err| AuthError::Store(anyhow::anyhow!("bcrypt hashing failed: {err}")))
}

/// Compare a supplied password against the stored credential.
///
/// The stored value is either a bcrypt hash or — on a fresh install whose
/// config password was never hashed — plaintext. The plaintext path runs
/// the comparison through a throwaway low-cost bcrypt hash so its timing
/// matches the hashed path.
#[must_use]
pub fn verify_password(supplied: &str, stored: &str) -> PasswordCheck {
    if stored.starts_with("$2") {
        return match verify(supplied, stored) {
            Ok(true) => PasswordCheck::Match,
            Ok(false) => PasswordCheck::Mismatch,
            Err(err) => {
                warn!(error = %err, "stored bcrypt hash failed to verify");
                PasswordCheck::Mismatch
            }
        };
    }

    // First-run plaintext credential: compare through a throwaway hash to
    // keep timing uniform with the hashed path.
    let throwaway = match hash(stored, MIN_BCRYPT_COST) {
        Ok(hashed) => hashed,
        Err(err) => {
            warn!(error = %err, "throwaway bcrypt hash failed");
            return PasswordCheck::Mismatch;
        }
    };
    match verify(supplied, &throwaway) {
        Ok(true) => PasswordCheck::MatchNeedsMigration,
        _ => PasswordCheck::Mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_requires_all_character_classes() {
        assert!(password_meets_policy("s3cret!pw"));
        assert!(!password_meets_policy("short1!"));
        assert!(!password_meets_policy("nodigits!!"));
        assert!(!password_meets_policy("n0symbols"));
        assert!(!password_meets_policy("12345678!"));
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let hashed = hash_password("s3cret!pw", 4).unwrap();
        assert_eq!(verify_password("s3cret!pw", &hashed), PasswordCheck::Match);
        assert_eq!(verify_password("wrong!pw1", &hashed), PasswordCheck::Mismatch);
    }

    #[test]
    fn weak_password_is_rejected_before_hashing() {
        assert!(matches!(
            hash_password("weak", 4),
            Err(AuthError::WeakPassword)
        ));
    }

    #[test]
    fn plaintext_path_signals_migration() {
        assert_eq!(
            verify_password("first-run-pw", "first-run-pw"),
            PasswordCheck::MatchNeedsMigration
        );
        assert_eq!(
            verify_password("other", "first-run-pw"),
            PasswordCheck::Mismatch
        );
    }
}
