//! Password hashing and opaque token generation.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::IdentityError;

/// Argon2id hasher. Hashing runs on the blocking pool so request tasks keep
/// making progress.
#[derive(Clone)]
pub struct Credentials {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    /// # Errors
    /// Returns an error if the cost parameters are out of range.
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, IdentityError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash synchronously; only meant for startup work.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash_password_blocking(&self, password: &str) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| IdentityError::Internal(anyhow!("failed to hash password: {err}")))
    }

    /// # Errors
    /// Returns an error if hashing fails or the blocking task panics.
    pub async fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash_password_blocking(&password))
            .await
            .context("password hashing task failed")?
    }

    /// Compare a password against a stored PHC string.
    ///
    /// # Errors
    /// Returns an error if the stored hash is malformed or the blocking task panics.
    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, IdentityError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|err| IdentityError::Internal(anyhow!("malformed password hash: {err}")))?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .context("password verification task failed")?
    }
}

/// 32 random bytes, URL-safe base64 without padding.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_token() -> Result<String, IdentityError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Six-digit numeric code for registration verification.
#[must_use]
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Only digests of tokens are ever persisted.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Constant-time digest comparison.
#[must_use]
pub fn digest_matches(expected: &[u8], presented: &[u8]) -> bool {
    expected.ct_eq(presented).into()
}
