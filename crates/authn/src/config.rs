//! Signature configuration shared by the signer and the verifier.

use std::{fmt, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use crate::{
    components::{Component, parse_components},
    error::AuthError,
    keys::{Algorithm, KeyRing, SigningKey, VerifyingKey},
};

/// Default key identifier.
pub const DEFAULT_KEY_ID: &str = "parabol";

/// Default signature label.
pub const DEFAULT_LABEL: &str = "sig1";

/// Default covered components.
pub const DEFAULT_COMPONENTS: &[&str] = &["@method", "@request-target", "content-digest"];

/// Default signature lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default tolerance for creation times slightly in the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Default name of the header carrying signature parameters.
pub const DEFAULT_SIGNATURE_INPUT_HEADER: &str = "signature-input";

/// Default name of the header carrying the signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "signature";

/// A secret string that is wiped on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps `value`.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// The secret text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty secret.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// How requests are signed and which signatures are accepted.
///
/// For `hmac-sha256` the secret is the shared secret, used as UTF-8 bytes.
/// For `ed25519` the secret is the base64 32-byte seed; a verifier that only
/// holds the public half sets `public_key` (base64) and leaves the secret empty.
///
/// # Example
///
/// ```
/// use linkbridge_authn::SignatureConfig;
///
/// let config = SignatureConfig::builder().secret("shared-secret").build()?;
/// assert_eq!(config.key_id(), "parabol");
/// # Ok::<(), linkbridge_authn::AuthError>(())
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfig {
    #[serde(default = "default_key_id")]
    key_id: String,

    #[serde(default)]
    secret: Secret,

    #[serde(default)]
    public_key: Option<String>,

    #[serde(default)]
    algorithm: Algorithm,

    #[serde(default = "default_label")]
    label: String,

    #[serde(default)]
    verify_label: Option<String>,

    #[serde(default = "default_components")]
    covered_components: Vec<String>,

    #[serde(with = "humantime_serde", default = "default_ttl")]
    ttl: Duration,

    #[serde(with = "humantime_serde", default = "default_clock_skew")]
    clock_skew: Duration,

    #[serde(with = "humantime_serde::option", default)]
    max_age: Option<Duration>,

    #[serde(default)]
    tag: Option<String>,

    #[serde(default = "default_signature_input_header")]
    signature_input_header: String,

    #[serde(default = "default_signature_header")]
    signature_header: String,
}

fn default_key_id() -> String {
    DEFAULT_KEY_ID.to_owned()
}

fn default_label() -> String {
    DEFAULT_LABEL.to_owned()
}

fn default_components() -> Vec<String> {
    DEFAULT_COMPONENTS.iter().map(|c| (*c).to_owned()).collect()
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

fn default_signature_input_header() -> String {
    DEFAULT_SIGNATURE_INPUT_HEADER.to_owned()
}

fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_owned()
}

#[bon::bon]
impl SignatureConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if [`validate`](Self::validate) fails.
    #[builder]
    pub fn new(
        #[builder(into)] secret: String,
        #[builder(into, default = DEFAULT_KEY_ID.to_owned())] key_id: String,
        #[builder(into)] public_key: Option<String>,
        #[builder(default)] algorithm: Algorithm,
        #[builder(into, default = DEFAULT_LABEL.to_owned())] label: String,
        #[builder(into)] verify_label: Option<String>,
        #[builder(default = default_components())] covered_components: Vec<String>,
        #[builder(default = DEFAULT_TTL)] ttl: Duration,
        #[builder(default = DEFAULT_CLOCK_SKEW)] clock_skew: Duration,
        max_age: Option<Duration>,
        #[builder(into)] tag: Option<String>,
        #[builder(into, default = DEFAULT_SIGNATURE_INPUT_HEADER.to_owned())]
        signature_input_header: String,
        #[builder(into, default = DEFAULT_SIGNATURE_HEADER.to_owned())] signature_header: String,
    ) -> Result<Self, AuthError> {
        let config = Self {
            key_id,
            secret: Secret::new(secret),
            public_key,
            algorithm,
            label,
            verify_label,
            covered_components,
            ttl,
            clock_skew,
            max_age,
            tag,
            signature_input_header,
            signature_header,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// Deserialized configurations skip the builder, so loaders call this
    /// explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.key_id.is_empty() || self.key_id.contains('"') {
            return Err(AuthError::signing_config("key_id must be non-empty and unquoted"));
        }
        for label in [Some(&self.label), self.verify_label.as_ref()].into_iter().flatten() {
            if !valid_label(label) {
                return Err(AuthError::signing_config(format!("invalid label '{label}'")));
            }
        }
        if self.tag.as_deref().is_some_and(|t| t.contains('"')) {
            return Err(AuthError::signing_config("tag cannot contain '\"'"));
        }
        if self.ttl.is_zero() {
            return Err(AuthError::signing_config("ttl must be greater than zero"));
        }
        for name in [&self.signature_input_header, &self.signature_header] {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(AuthError::signing_config(format!("invalid header name '{name}'")));
            }
        }
        parse_components(&self.covered_components)?;
        if self.secret.is_empty() && self.public_key.is_none() {
            return Err(AuthError::signing_config("a secret or a public key is required"));
        }
        self.key_ring()?;
        Ok(())
    }

    /// Key identifier placed in `keyid`.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signature algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Label outbound signatures are emitted under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label inbound signatures are looked up under; defaults to [`label`](Self::label).
    ///
    /// Peers that sign under their own label (for example `parabol`) are
    /// verified by setting this.
    #[must_use]
    pub fn verify_label(&self) -> &str {
        self.verify_label.as_deref().unwrap_or(&self.label)
    }

    /// Signature lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Accepted clock skew for creation times.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Maximum accepted signature age, if any.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Application tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Header carrying signature parameters.
    #[must_use]
    pub fn signature_input_header(&self) -> &str {
        &self.signature_input_header
    }

    /// Header carrying the signature.
    #[must_use]
    pub fn signature_header(&self) -> &str {
        &self.signature_header
    }

    /// Returns a copy with the secret replaced.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Secret::new(secret);
        self
    }

    /// Parsed covered components.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] for an invalid component list.
    pub fn components(&self) -> Result<Vec<Component>, AuthError> {
        parse_components(&self.covered_components)
    }

    /// Key used to sign outbound requests.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] when no usable secret is configured.
    pub fn signing_key(&self) -> Result<SigningKey, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::signing_config("no signing secret configured"));
        }
        match self.algorithm {
            Algorithm::HmacSha256 => SigningKey::hmac(self.secret.expose()),
            Algorithm::Ed25519 => {
                let seed = Zeroizing::new(decode_base64("secret", self.secret.expose())?);
                SigningKey::ed25519(&seed)
            },
        }
    }

    /// Key ring holding this configuration's verification key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] when no usable key is configured.
    pub fn key_ring(&self) -> Result<KeyRing, AuthError> {
        let key = match (&self.public_key, self.algorithm) {
            (Some(public), Algorithm::Ed25519) => {
                VerifyingKey::ed25519(&decode_base64("public_key", public)?)?
            },
            (Some(_), Algorithm::HmacSha256) => {
                return Err(AuthError::signing_config("public_key requires the ed25519 algorithm"));
            },
            (None, _) => self.signing_key()?.verifying_key(),
        };
        Ok(KeyRing::new().with_key(self.key_id.clone(), key))
    }
}

impl fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("key_id", &self.key_id)
            .field("secret", &self.secret)
            .field("public_key", &self.public_key)
            .field("algorithm", &self.algorithm)
            .field("label", &self.label)
            .field("verify_label", &self.verify_label)
            .field("covered_components", &self.covered_components)
            .field("ttl", &self.ttl)
            .field("clock_skew", &self.clock_skew)
            .field("max_age", &self.max_age)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, AuthError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| AuthError::signing_config(format!("{field} is not valid base64: {e}")))
}
