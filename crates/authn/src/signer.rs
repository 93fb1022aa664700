//! Outbound request signing.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use http::{HeaderName, HeaderValue};

use crate::{
    base::{SignatureParams, signature_base},
    components::{CONTENT_DIGEST, Component, RequestView},
    config::SignatureConfig,
    digest::content_digest,
    error::AuthError,
    keys::SigningKey,
};

/// Signs outbound requests by adding `Content-Digest`, `Signature-Input`
/// and `Signature` headers. The body is never modified.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use linkbridge_authn::{RequestSigner, SignatureConfig};
///
/// let config = SignatureConfig::builder().secret("shared-secret").build()?;
/// let signer = RequestSigner::from_config(&config)?;
///
/// let mut request = http::Request::post("https://remote.example/mattermost/notify")
///     .body(Bytes::from_static(b"{}"))
///     .unwrap();
/// signer.sign(&mut request)?;
///
/// assert!(request.headers().contains_key("signature"));
/// assert!(request.headers().contains_key("content-digest"));
/// # Ok::<(), linkbridge_authn::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RequestSigner {
    key: SigningKey,
    key_id: String,
    label: String,
    components: Vec<Component>,
    ttl: Duration,
    tag: Option<String>,
    signature_input_header: HeaderName,
    signature_header: HeaderName,
}

impl RequestSigner {
    /// Derives a signer from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if the key or components are unusable.
    pub fn from_config(config: &SignatureConfig) -> Result<Self, AuthError> {
        Ok(Self {
            key: config.signing_key()?,
            key_id: config.key_id().to_owned(),
            label: config.label().to_owned(),
            components: config.components()?,
            ttl: config.ttl(),
            tag: config.tag().map(str::to_owned),
            signature_input_header: header_name(config.signature_input_header())?,
            signature_header: header_name(config.signature_header())?,
        })
    }

    /// Signs `request` as of now.
    ///
    /// # Errors
    ///
    /// Same as [`sign_at`](Self::sign_at).
    pub fn sign<B: AsRef<[u8]>>(&self, request: &mut http::Request<B>) -> Result<(), AuthError> {
        self.sign_at(request, Utc::now())
    }

    /// Signs `request` with `created = now` and `expires = now + ttl`.
    ///
    /// When the body is empty no digest is attached and `content-digest` is
    /// dropped from the covered components for this request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningConfig`] if a covered component is missing
    /// from the request or the signature cannot be produced.
    pub fn sign_at<B: AsRef<[u8]>>(
        &self,
        request: &mut http::Request<B>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let body_empty = request.body().as_ref().is_empty();
        let components: Vec<Component> = self
            .components
            .iter()
            .filter(|c| !(body_empty && c.is_content_digest()))
            .cloned()
            .collect();

        if !body_empty && components.iter().any(Component::is_content_digest) {
            let digest = content_digest(request.body().as_ref());
            request.headers_mut().insert(
                HeaderName::from_static(CONTENT_DIGEST),
                header_value(&digest)?,
            );
        }

        let created = now.timestamp();
        let ttl = i64::try_from(self.ttl.as_secs())
            .map_err(|_| AuthError::signing_config("ttl is too large"))?;
        let params = SignatureParams {
            components,
            created,
            expires: Some(created.saturating_add(ttl)),
            key_id: self.key_id.clone(),
            algorithm: Some(self.key.algorithm()),
            tag: self.tag.clone(),
        };
        let serialized = params.serialize();

        let base = signature_base(&params.components, &RequestView::of(request), &serialized)
            .map_err(AuthError::signing_config)?;
        let signature = STANDARD.encode(self.key.sign(base.as_bytes())?);

        tracing::debug!(
            key_id = %self.key_id,
            alg = %self.key.algorithm(),
            components = params.components.len(),
            "signed outbound request",
        );

        let headers = request.headers_mut();
        headers.insert(
            self.signature_input_header.clone(),
            header_value(&format!("{}={serialized}", self.label))?,
        );
        headers.insert(
            self.signature_header.clone(),
            header_value(&format!("{}=:{signature}:", self.label))?,
        );
        Ok(())
    }
}

fn header_name(name: &str) -> Result<HeaderName, AuthError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AuthError::signing_config(format!("invalid header name '{name}': {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value)
        .map_err(|e| AuthError::signing_config(format!("invalid header value: {e}")))
}
