//! Shared test utilities for signing and verification tests.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! ```toml
//! [dev-dependencies]
//! linkbridge-authn = { path = "../authn", features = ["testutil"] }
//! ```

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::{
    config::SignatureConfig, keys::Algorithm, signer::RequestSigner, verifier::RequestVerifier,
};

/// Shared secret used by [`hmac_config`].
pub const TEST_SECRET: &str = "test-shared-secret";

/// A fixed instant (2023-11-14T22:13:20Z) for deterministic signatures.
///
/// # Panics
///
/// Never; the timestamp is in range.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().expect("timestamp in range")
}

/// HMAC configuration with every default and [`TEST_SECRET`].
///
/// # Panics
///
/// Panics if the default configuration fails validation.
#[must_use]
pub fn hmac_config() -> SignatureConfig {
    SignatureConfig::builder().secret(TEST_SECRET).build().expect("valid test config")
}

/// Ed25519 configuration with a fresh random seed.
///
/// Returns the full configuration and a verify-only configuration holding
/// just the public key.
///
/// # Panics
///
/// Panics if the generated configuration fails validation.
#[must_use]
pub fn ed25519_configs() -> (SignatureConfig, SignatureConfig) {
    let key = SigningKey::generate(&mut OsRng);
    let seed = Zeroizing::new(STANDARD.encode(key.to_bytes()));
    let public = STANDARD.encode(key.verifying_key().to_bytes());

    let full = SignatureConfig::builder()
        .secret(seed.as_str())
        .algorithm(Algorithm::Ed25519)
        .build()
        .expect("valid ed25519 config");
    let verify_only = SignatureConfig::builder()
        .secret("")
        .public_key(public)
        .algorithm(Algorithm::Ed25519)
        .build()
        .expect("valid ed25519 verify-only config");
    (full, verify_only)
}

/// Signer and verifier sharing `config`.
///
/// # Panics
///
/// Panics if `config` cannot produce both halves.
#[must_use]
pub fn pair(config: &SignatureConfig) -> (RequestSigner, RequestVerifier) {
    (
        RequestSigner::from_config(config).expect("signer from config"),
        RequestVerifier::from_config(config).expect("verifier from config"),
    )
}

/// A notification request like the remote service sends.
///
/// # Panics
///
/// Never for a valid `path`.
#[must_use]
pub fn notification_request(path: &str, body: &'static str) -> http::Request<Bytes> {
    http::Request::post(path)
        .header("content-type", "application/json")
        .body(Bytes::from_static(body.as_bytes()))
        .expect("valid request")
}

/// [`notification_request`] signed with `signer` at [`fixed_now`].
///
/// # Panics
///
/// Panics if signing fails.
#[must_use]
pub fn signed_notification(
    signer: &RequestSigner,
    path: &str,
    body: &'static str,
) -> http::Request<Bytes> {
    let mut request = notification_request(path, body);
    signer.sign_at(&mut request, fixed_now()).expect("signing succeeds");
    request
}
