//! # Link Bridge Request Authentication
//!
//! HTTP message signatures for the trust boundary between the chat plugin
//! and the remote collaboration service.
//!
//! This crate provides:
//! - **Signing**: [`RequestSigner`] covers selected request components and a
//!   body digest with a time-bounded signature
//! - **Verification**: [`RequestVerifier`] rebuilds the signature base and
//!   rejects missing, unknown-key, forged or expired signatures
//! - **Keys**: HMAC-SHA256 shared secrets (default) and Ed25519 key pairs,
//!   looked up by key id in a [`KeyRing`]
//!
//! ## Security
//!
//! - Signature comparison is constant time
//! - Unknown key ids are checked against a random decoy key, so they cost the
//!   same as a bad signature
//! - Rejections display as one fixed message; the [`RejectReason`] is only
//!   for logs
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use linkbridge_authn::{RequestSigner, RequestVerifier, SignatureConfig};
//!
//! let config = SignatureConfig::builder().secret("shared-secret").build()?;
//! let signer = RequestSigner::from_config(&config)?;
//! let verifier = RequestVerifier::from_config(&config)?;
//!
//! let mut request = http::Request::post("/notify/C1")
//!     .body(Bytes::from_static(br#"{"type":"meetingStarted"}"#))
//!     .unwrap();
//! signer.sign(&mut request)?;
//!
//! let verified = verifier.verify(&request)?;
//! assert_eq!(verified.key_id, "parabol");
//! # Ok::<(), linkbridge_authn::AuthError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Signature parameters and signature base.
pub mod base;
/// Covered request components.
pub mod components;
/// Signature configuration.
pub mod config;
/// `Content-Digest` values.
pub mod digest;
/// Authentication error types.
pub mod error;
/// Algorithms, keys and key ring.
pub mod keys;
/// Outbound signing.
pub mod signer;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Inbound verification.
pub mod verifier;

// Re-export key types for convenience
pub use components::{Component, RequestView};
pub use config::{DEFAULT_KEY_ID, Secret, SignatureConfig};
pub use error::{AuthError, REJECTION_MESSAGE, RejectReason, Rejection, Result};
pub use keys::{Algorithm, KeyRing, SigningKey, VerifyingKey};
pub use signer::RequestSigner;
pub use verifier::{RequestVerifier, VerifiedSignature};
