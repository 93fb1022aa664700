//! Inbound request verification.
//!
//! Verification is terminal: a request is either accepted or rejected with a
//! [`RejectReason`]. The checks run in this order, and a signature is always
//! computed before any decision so that unknown keys and bad signatures take
//! the same path:
//!
//! 1. parse `Signature-Input` and `Signature` for the configured verify label
//! 2. look up the key id (unknown ids are checked against a random decoy key)
//! 3. rebuild the signature base and check the signature
//! 4. require every expected component to be covered, and the body digest to match
//! 5. check the validity window

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use http::HeaderName;

use crate::{
    base::{SignatureParams, byte_sequence, dictionary_member, signature_base},
    components::{CONTENT_DIGEST, Component, RequestView},
    config::SignatureConfig,
    digest::digest_matches,
    error::{AuthError, RejectReason, Rejection},
    keys::{KeyRing, VerifyingKey},
};

/// Facts about an accepted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    /// Key identifier that produced the signature.
    pub key_id: String,
    /// Signature creation time.
    pub created: DateTime<Utc>,
    /// Components the signature covers.
    pub components: Vec<Component>,
}

/// Verifies signed inbound requests against a [`KeyRing`].
#[derive(Debug, Clone)]
pub struct RequestVerifier {
    keys: KeyRing,
    label: String,
    expected: Vec<Component>,
    ttl: Duration,
    clock_skew: Duration,
    max_age: Option<Duration>,
    tag: Option<String>,
    signature_input_header: HeaderName,
    signature_header: HeaderName,
}

impl RequestVerifier {
    /// Derives a verifier from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if no verification key can be built.
    pub fn from_config(config: &SignatureConfig) -> Result<Self, AuthError> {
        Ok(Self {
            keys: config.key_ring()?,
            label: config.verify_label().to_owned(),
            expected: config.components()?,
            ttl: config.ttl(),
            clock_skew: config.clock_skew(),
            max_age: config.max_age(),
            tag: config.tag().map(str::to_owned),
            signature_input_header: header_name(config.signature_input_header())?,
            signature_header: header_name(config.signature_header())?,
        })
    }

    /// Replaces the key ring, for deployments with several live keys.
    #[must_use]
    pub fn with_key_ring(mut self, keys: KeyRing) -> Self {
        self.keys = keys;
        self
    }

    /// Verifies `request` as of now.
    ///
    /// # Errors
    ///
    /// Same as [`verify_at`](Self::verify_at).
    pub fn verify<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
    ) -> Result<VerifiedSignature, AuthError> {
        self.verify_at(request, Utc::now())
    }

    /// Verifies `request` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] with the failing [`RejectReason`].
    pub fn verify_at<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSignature, AuthError> {
        self.check(request, now).map_err(|rejection| {
            tracing::warn!(
                reason = %rejection.reason(),
                detail = rejection.detail(),
                method = %request.method(),
                path = request.uri().path(),
                "rejected inbound request signature",
            );
            AuthError::Rejected(rejection)
        })
    }

    fn check<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSignature, Rejection> {
        let (raw_params, signature) = self.extract(request)?;
        let params = SignatureParams::parse(raw_params)
            .map_err(|e| Rejection::new(RejectReason::MissingSignature, e))?;

        let known = self.keys.get(&params.key_id);
        let decoy;
        let key = match known {
            Some(key) => key,
            None => {
                decoy = VerifyingKey::decoy();
                &decoy
            },
        };

        // A missing component still costs one verification so the outcome
        // timing does not depend on which header was absent.
        let view = RequestView::of(request);
        let base = signature_base(&params.components, &view, raw_params);
        let valid = key.verify(base.as_deref().unwrap_or(raw_params).as_bytes(), &signature);

        if known.is_none() {
            return Err(Rejection::new(
                RejectReason::UnknownKey,
                format!("unknown key id '{}'", params.key_id),
            ));
        }
        if let Err(detail) = base {
            return Err(Rejection::new(RejectReason::BadSignature, detail));
        }
        if !valid {
            return Err(Rejection::new(RejectReason::BadSignature, "signature mismatch"));
        }
        if let Some(alg) = params.algorithm
            && alg != key.algorithm()
        {
            return Err(Rejection::new(
                RejectReason::BadSignature,
                format!("alg '{alg}' does not match key"),
            ));
        }
        if let Some(tag) = &self.tag
            && params.tag.as_ref() != Some(tag)
        {
            return Err(Rejection::new(RejectReason::BadSignature, "tag mismatch"));
        }

        self.check_coverage(&params, request)?;
        self.check_window(&params, now)?;

        let created = Utc
            .timestamp_opt(params.created, 0)
            .single()
            .ok_or_else(|| Rejection::new(RejectReason::Expired, "created out of range"))?;
        Ok(VerifiedSignature { key_id: params.key_id, created, components: params.components })
    }

    fn extract<'r, B>(
        &self,
        request: &'r http::Request<B>,
    ) -> Result<(&'r str, Vec<u8>), Rejection> {
        let missing = |detail: &str| Rejection::new(RejectReason::MissingSignature, detail);

        let input = request
            .headers()
            .get(&self.signature_input_header)
            .ok_or_else(|| missing("no signature input header"))?
            .to_str()
            .map_err(|_| missing("signature input header is not ASCII"))?;
        let signature = request
            .headers()
            .get(&self.signature_header)
            .ok_or_else(|| missing("no signature header"))?
            .to_str()
            .map_err(|_| missing("signature header is not ASCII"))?;

        let raw_params = dictionary_member(input, &self.label)
            .ok_or_else(|| missing("no signature input for label"))?;
        let encoded = dictionary_member(signature, &self.label)
            .and_then(byte_sequence)
            .ok_or_else(|| missing("no signature for label"))?;
        let decoded = STANDARD.decode(encoded).map_err(|_| missing("signature is not base64"))?;
        Ok((raw_params, decoded))
    }

    fn check_coverage<B: AsRef<[u8]>>(
        &self,
        params: &SignatureParams,
        request: &http::Request<B>,
    ) -> Result<(), Rejection> {
        let body = request.body().as_ref();
        for expected in &self.expected {
            // Bodyless requests are signed without a digest.
            if expected.is_content_digest() && body.is_empty() {
                continue;
            }
            if !params.components.contains(expected) {
                return Err(Rejection::new(
                    RejectReason::BadSignature,
                    format!("{expected} is not covered"),
                ));
            }
        }

        if !body.is_empty() && params.components.iter().any(Component::is_content_digest) {
            let header = request
                .headers()
                .get(CONTENT_DIGEST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !digest_matches(header, body) {
                return Err(Rejection::new(RejectReason::BadSignature, "content digest mismatch"));
            }
        }
        Ok(())
    }

    fn check_window(&self, params: &SignatureParams, now: DateTime<Utc>) -> Result<(), Rejection> {
        let now = now.timestamp();
        let skew = secs(self.clock_skew);
        // A signer may shorten the window with `expires` but never extend it past ttl.
        let ttl_end = params.created.saturating_add(secs(self.ttl));
        let expires = params.expires.map_or(ttl_end, |expires| expires.min(ttl_end));

        if params.created.saturating_sub(skew) > now {
            return Err(Rejection::new(RejectReason::Expired, "created is in the future"));
        }
        if now > expires {
            return Err(Rejection::new(RejectReason::Expired, "signature has expired"));
        }
        if let Some(max_age) = self.max_age
            && now.saturating_sub(params.created) > secs(max_age)
        {
            return Err(Rejection::new(RejectReason::Expired, "signature is older than max age"));
        }
        Ok(())
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn header_name(name: &str) -> Result<HeaderName, AuthError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AuthError::signing_config(format!("invalid header name '{name}': {e}")))
}
