//! Password hashing and login-token issuance.
//!
//! Stored hashes are self-describing strings:
//! `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>`, so the iteration
//! count can be raised without invalidating existing accounts.

use std::num::NonZeroU32;

use rand::RngCore;
use ring::pbkdf2;
use uuid::Uuid;

use crate::constants::{
    DEFAULT_PASSWORD_ITERATIONS, PASSWORD_HASH_SIZE, PASSWORD_SALT_SIZE, PASSWORD_SCHEME,
};
use crate::error::CredentialError;

/// One-way password hashing used by the user directory.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// Returns `false` for a wrong password and for malformed stored hashes.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_PASSWORD_ITERATIONS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let iterations = NonZeroU32::new(self.iterations).ok_or(CredentialError::ZeroIterations)?;

        let mut salt = [0u8; PASSWORD_SALT_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CredentialError::Rng(e.to_string()))?;

        let mut derived = [0u8; PASSWORD_HASH_SIZE];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &mut derived,
        );

        Ok(format!(
            "{PASSWORD_SCHEME}${}${}${}",
            iterations,
            hex::encode(salt),
            hex::encode(derived)
        ))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let mut parts = stored.split('$');
        let (Some(scheme), Some(iterations), Some(salt), Some(derived), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        if scheme != PASSWORD_SCHEME {
            return false;
        }

        let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
            return false;
        };
        let (Ok(salt), Ok(derived)) = (hex::decode(salt), hex::decode(derived)) else {
            return false;
        };

        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &derived,
        )
        .is_ok()
    }
}

/// Fresh opaque token for QR-code login.
pub fn generate_login_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hasher = Pbkdf2Hasher::new(1_000);
        let stored = hasher.hash("hunter2").unwrap();

        assert!(stored.starts_with("pbkdf2_sha256$1000$"));
        assert!(hasher.verify("hunter2", &stored));
        assert!(!hasher.verify("hunter3", &stored));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = Pbkdf2Hasher::new(1_000);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_verify_uses_stored_iteration_count() {
        let stored = Pbkdf2Hasher::new(1_000).hash("pw").unwrap();
        assert!(Pbkdf2Hasher::new(5_000).verify("pw", &stored));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        let hasher = Pbkdf2Hasher::default();
        assert!(!hasher.verify("pw", ""));
        assert!(!hasher.verify("pw", "pbkdf2_sha256$0$00$00"));
        assert!(!hasher.verify("pw", "md5$1000$zz$zz"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            Pbkdf2Hasher::new(0).hash("pw"),
            Err(CredentialError::ZeroIterations)
        ));
    }

    #[test]
    fn test_login_tokens_are_unique() {
        assert_ne!(generate_login_token(), generate_login_token());
    }
}
