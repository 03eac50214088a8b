//! Password hashing and verification using bcrypt
//!
//! The stored string is the modular-crypt bcrypt form (`$2b$<cost>$<salt+digest>`),
//! so salt and cost travel with the hash and verification needs no other state.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Secret must not be empty")]
    InvalidInput,

    #[error("Failed to hash secret: {0}")]
    Hashing(String),
}

/// An irreversible password hash as stored in `users.password_hash`
#[derive(Clone, PartialEq, Eq)]
pub struct HashedCredential(String);

impl HashedCredential {
    /// Wrap a hash read back from storage. Malformed values are accepted here
    /// and simply never verify.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedCredential(..)")
    }
}

/// Salted, slow one-way hashing with a configured cost factor
#[derive(Debug, Clone, Copy)]
pub struct CredentialCodec {
    cost: u32,
}

impl CredentialCodec {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, secret: &str) -> Result<HashedCredential, CredentialError> {
        if secret.is_empty() {
            return Err(CredentialError::InvalidInput);
        }

        bcrypt::hash(secret, self.cost)
            .map(HashedCredential)
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Returns false for a wrong secret and for any malformed stored value.
    /// bcrypt compares the digests in constant time.
    pub fn verify(&self, secret: &str, stored: &HashedCredential) -> bool {
        match bcrypt::verify(secret, stored.as_str()) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!("Stored credential could not be parsed: {}", e);
                false
            }
        }
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_blocking(&self, secret: String) -> Result<HashedCredential, CredentialError> {
        let codec = *self;
        tokio::task::spawn_blocking(move || codec.hash(&secret))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_blocking(&self, secret: String, stored: HashedCredential) -> bool {
        let codec = *self;
        tokio::task::spawn_blocking(move || codec.verify(&secret, &stored))
            .await
            .unwrap_or(false)
    }
}
