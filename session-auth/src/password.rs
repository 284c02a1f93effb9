//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$...`), so the salt and
//! cost parameters travel with the hash. Both operations are CPU-bound on
//! purpose; the async wrappers move them onto the blocking pool.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use thiserror::Error;

/// Well-formed hash that no password is expected to match. Verified against
/// when the username is unknown so both failure paths cost the same.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2Vzc2lvbi1hdXRoLWRteQ$BwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSY";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordError::Hash)?;
    Ok(hash.to_string())
}

/// Returns `false` for a mismatch and for a stored hash that does not parse.
/// The digest comparison inside `verify_password` is constant-time.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub async fn hash_in_background(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// Verifies `password` against `stored_hash`, or against a dummy hash when
/// there is no stored hash (unknown user). Always returns `false` in the
/// latter case.
pub async fn verify_in_background(
    password: String,
    stored_hash: Option<String>,
) -> Result<bool, PasswordError> {
    let verified = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            let _ = verify_password(&password, DUMMY_HASH);
            false
        }
    })
    .await?;
    Ok(verified)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use anyhow::Result;

    use super::{hash_password, verify_in_background, verify_password, DUMMY_HASH};

    #[test]
    fn hash_is_salted_phc_string() -> Result<()> {
        let first = hash_password("pikachu")?;
        let second = hash_password("pikachu")?;

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("pikachu"));
        Ok(())
    }

    #[test]
    fn verify_accepts_matching_password() -> Result<()> {
        let hash = hash_password("pikachu")?;
        assert!(verify_password("pikachu", &hash));
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_password() -> Result<()> {
        let hash = hash_password("pikachu")?;
        assert!(!verify_password("raichu", &hash));
        assert!(!verify_password("", &hash));
        Ok(())
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("pikachu", "pikachu"));
        assert!(!verify_password("pikachu", ""));
    }

    #[test]
    fn dummy_hash_parses_and_matches_nothing() {
        assert!(argon2::password_hash::PasswordHash::new(DUMMY_HASH).is_ok());
        assert!(!verify_password("", DUMMY_HASH));
        assert!(!verify_password("pikachu", DUMMY_HASH));
    }

    #[tokio::test]
    async fn background_verify_without_stored_hash_is_false() -> Result<()> {
        assert!(!verify_in_background(String::from("pikachu"), None).await?);

        let hash = hash_password("pikachu")?;
        assert!(verify_in_background(String::from("pikachu"), Some(hash)).await?);
        Ok(())
    }
}
