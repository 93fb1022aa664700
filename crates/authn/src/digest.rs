//! `Content-Digest` header values (`sha-256=:<base64>:`).

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Computes the `Content-Digest` value for `body`.
#[must_use]
pub fn content_digest(body: &[u8]) -> String {
    format!("sha-256=:{}:", STANDARD.encode(Sha256::digest(body)))
}

/// Returns `true` if `header` carries a `sha-256` digest equal to that of `body`.
///
/// Other algorithms listed in the header are ignored; a header without a
/// `sha-256` member never matches.
#[must_use]
pub fn digest_matches(header: &str, body: &[u8]) -> bool {
    let expected = Sha256::digest(body);
    header
        .split(',')
        .filter_map(|member| member.trim().split_once('='))
        .filter(|(alg, _)| alg.trim().eq_ignore_ascii_case("sha-256"))
        .filter_map(|(_, value)| {
            let value = value.trim().strip_prefix(':')?.strip_suffix(':')?;
            STANDARD.decode(value).ok()
        })
        .any(|decoded| bool::from(decoded.as_slice().ct_eq(expected.as_slice())))
}
