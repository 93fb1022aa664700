//! Signature algorithms, keys and the verification key ring.
//!
//! # Security
//!
//! - HMAC comparison is constant time ([`subtle::ConstantTimeEq`])
//! - Ed25519 uses strict verification (rejects malleable signatures)
//! - Secret material is held in [`Zeroizing`] buffers and never printed

use std::{collections::HashMap, fmt, str::FromStr};

use ed25519_dalek::{Signer as _, Signature};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Length of an Ed25519 secret seed or public key.
pub const ED25519_KEY_LENGTH: usize = 32;

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// HMAC with SHA-256 over a shared secret.
    #[default]
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    /// Ed25519 over a key pair.
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl Algorithm {
    /// Name used in the `alg` signature parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hmac-sha256" => Ok(Self::HmacSha256),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(AuthError::signing_config(format!("unsupported algorithm '{other}'"))),
        }
    }
}

/// Key material used to produce signatures.
#[derive(Clone)]
pub enum SigningKey {
    /// Shared HMAC secret.
    HmacSha256(Zeroizing<Vec<u8>>),
    /// Ed25519 private key.
    Ed25519(ed25519_dalek::SigningKey),
}

impl SigningKey {
    /// Creates an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if `secret` is empty.
    pub fn hmac(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::signing_config("HMAC secret is empty"));
        }
        Ok(Self::HmacSha256(Zeroizing::new(secret.to_vec())))
    }

    /// Creates an Ed25519 key from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if `seed` is not 32 bytes long.
    pub fn ed25519(seed: &[u8]) -> Result<Self, AuthError> {
        let seed: Zeroizing<[u8; ED25519_KEY_LENGTH]> =
            Zeroizing::new(seed.try_into().map_err(|_| {
                AuthError::signing_config(format!(
                    "Ed25519 seed must be {ED25519_KEY_LENGTH} bytes, got {}",
                    seed.len()
                ))
            })?);
        Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
    }

    /// Algorithm this key signs with.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::HmacSha256(_) => Algorithm::HmacSha256,
            Self::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    /// The matching verification key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            Self::HmacSha256(secret) => VerifyingKey::HmacSha256(secret.clone()),
            Self::Ed25519(key) => VerifyingKey::Ed25519(key.verifying_key()),
        }
    }

    /// Signs `message`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if the key cannot be used.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self {
            Self::HmacSha256(secret) => Ok(hmac_sha256(secret, message)?.to_vec()),
            Self::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.algorithm()).field(&"[REDACTED]").finish()
    }
}

/// Key material used to check signatures.
#[derive(Clone)]
pub enum VerifyingKey {
    /// Shared HMAC secret.
    HmacSha256(Zeroizing<Vec<u8>>),
    /// Ed25519 public key.
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl VerifyingKey {
    /// Creates an Ed25519 verification key from its 32 public bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] for a wrong length or a point not on the curve.
    pub fn ed25519(public: &[u8]) -> Result<Self, AuthError> {
        let bytes: [u8; ED25519_KEY_LENGTH] = public.try_into().map_err(|_| {
            AuthError::signing_config(format!(
                "Ed25519 public key must be {ED25519_KEY_LENGTH} bytes, got {}",
                public.len()
            ))
        })?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self::Ed25519)
            .map_err(|e| AuthError::signing_config(format!("invalid Ed25519 public key: {e}")))
    }

    /// A random HMAC key that matches nothing, used to keep unknown-key
    /// lookups on the same code path as known ones.
    #[must_use]
    pub(crate) fn decoy() -> Self {
        let mut secret = Zeroizing::new(vec![0u8; 32]);
        rand::rng().fill(secret.as_mut_slice());
        Self::HmacSha256(secret)
    }

    /// Algorithm this key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::HmacSha256(_) => Algorithm::HmacSha256,
            Self::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    /// Returns `true` if `signature` is valid for `message`.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::HmacSha256(secret) => match hmac_sha256(secret, message) {
                Ok(expected) => bool::from(expected.as_slice().ct_eq(signature)),
                Err(_) => false,
            },
            Self::Ed25519(key) => match Signature::from_slice(signature) {
                Ok(sig) => key.verify_strict(message, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HmacSha256(_) => f.debug_tuple("HmacSha256").field(&"[REDACTED]").finish(),
            Self::Ed25519(key) => f.debug_tuple("Ed25519").field(key).finish(),
        }
    }
}

fn hmac_sha256(secret: &[u8], message: &[u8]) -> Result<[u8; 32], AuthError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| AuthError::signing_config(format!("invalid HMAC key: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Verification keys by key identifier. Several keys may be live during rotation.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<String, VerifyingKey>,
}

impl KeyRing {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the key for `key_id`.
    pub fn insert(&mut self, key_id: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(key_id.into(), key);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_key(mut self, key_id: impl Into<String>, key: VerifyingKey) -> Self {
        self.insert(key_id, key);
        self
    }

    /// Removes the key for `key_id`, returning it.
    pub fn remove(&mut self, key_id: &str) -> Option<VerifyingKey> {
        self.keys.remove(key_id)
    }

    /// Looks up the key for `key_id`.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(key_id)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the ring holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
