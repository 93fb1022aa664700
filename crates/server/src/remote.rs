//! Signed outbound calls to the remote collaboration service.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use linkbridge_authn::{AuthError, RequestSigner};

use crate::{
    config::BridgeConfig,
    headers::{HeaderCopyError, safe_copy_header},
};

/// Inbound header forwarded on outbound calls.
pub const FORWARDED_AUTHORIZATION: &str = "x-application-authorization";

/// Errors from an outbound call.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The remote URL and path do not form a valid URL.
    #[error("invalid remote endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// A forwarded header failed the copy guard.
    #[error(transparent)]
    Header(#[from] HeaderCopyError),

    /// The request could not be signed.
    #[error("signing failed: {0}")]
    Signing(#[from] AuthError),

    /// The request could not be assembled.
    #[error("invalid outbound request: {0}")]
    Request(#[from] http::Error),

    /// The HTTP client failed to build, connect or read the response.
    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a status the caller does not relay.
    #[error("remote service answered {0}")]
    Status(StatusCode),
}

/// Response relayed back to the caller.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    /// Status returned by the remote service.
    pub status: StatusCode,
    /// Its `Content-Type`, if any.
    pub content_type: Option<HeaderValue>,
    /// Response body.
    pub body: Bytes,
}

/// HTTP client that signs every request it sends.
///
/// Signing settings and the remote URL come from the [`BridgeConfig`]
/// passed to each call, so a replaced configuration takes effect on the
/// next request.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] if the TLS backend cannot initialize.
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Builds and signs a JSON POST to `path` on the remote service.
    ///
    /// [`FORWARDED_AUTHORIZATION`] is copied from `inbound` through
    /// [`safe_copy_header`].
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the URL, a forwarded header, or signing fails.
    pub fn signed_post(
        config: &BridgeConfig,
        path: &str,
        body: Bytes,
        inbound: &HeaderMap,
    ) -> Result<http::Request<Bytes>, RemoteError> {
        let url = config.endpoint(path)?;
        let mut request = http::Request::post(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(body)?;
        safe_copy_header(inbound, FORWARDED_AUTHORIZATION, request.headers_mut())?;

        RequestSigner::from_config(&config.signature)?.sign(&mut request)?;
        Ok(request)
    }

    /// Signs and sends a JSON POST to `path` on the remote service.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the request cannot be built or signed, or
    /// the remote service cannot be reached.
    #[tracing::instrument(
        name = "remote_post",
        skip(self, config, body, inbound),
        fields(path = %path)
    )]
    pub async fn post(
        &self,
        config: &BridgeConfig,
        path: &str,
        body: Bytes,
        inbound: &HeaderMap,
    ) -> Result<RemoteResponse, RemoteError> {
        let request = Self::signed_post(config, path, body, inbound)?;
        let request = reqwest::Request::try_from(request)?;

        let response = self.http.execute(request).await?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        tracing::debug!(status = status.as_u16(), bytes = body.len(), "remote responded");
        Ok(RemoteResponse { status, content_type, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use linkbridge_authn::{RequestVerifier, SignatureConfig};
    use url::Url;

    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::builder()
            .remote_url(Url::parse("https://remote.example").unwrap())
            .signature(SignatureConfig::builder().secret("shared").build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_signed_post_verifies_and_forwards_authorization() {
        let config = config();
        let mut inbound = HeaderMap::new();
        inbound.insert(FORWARDED_AUTHORIZATION, "Bearer abc".parse().unwrap());
        inbound.insert("cookie", "session=1".parse().unwrap());

        let request =
            RemoteClient::signed_post(&config, "/graphql", Bytes::from_static(b"{}"), &inbound)
                .unwrap();

        assert_eq!(request.uri(), "https://remote.example/graphql");
        assert_eq!(request.headers()[FORWARDED_AUTHORIZATION], "Bearer abc");
        assert!(!request.headers().contains_key("cookie"));
        assert!(request.headers().contains_key("signature"));

        let verifier = RequestVerifier::from_config(&config.signature).unwrap();
        assert!(verifier.verify(&request).is_ok());
    }

    #[test]
    fn test_oversized_forwarded_header_fails_before_signing() {
        let mut inbound = HeaderMap::new();
        inbound.insert(FORWARDED_AUTHORIZATION, "x".repeat(2048).parse().unwrap());

        let err = RemoteClient::signed_post(&config(), "/graphql", Bytes::new(), &inbound)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Header(HeaderCopyError::TooLong { .. })));
    }

    #[test]
    fn test_verify_only_config_cannot_sign() {
        let mut config = config();
        let (_, verify_only) = linkbridge_authn::testutil::ed25519_configs();
        config.signature = verify_only;

        let err =
            RemoteClient::signed_post(&config, "/graphql", Bytes::new(), &HeaderMap::new())
                .unwrap_err();
        assert!(matches!(err, RemoteError::Signing(_)));
    }
}
