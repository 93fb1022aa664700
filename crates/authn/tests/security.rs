//! Security-focused verification tests.
//!
//! These tests check the verifier's resistance to common attacks on signed
//! requests: algorithm substitution, parameter tampering, signature transplant
//! to another path, stale signatures, key rotation and malformed headers.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::SigningKey as DalekSigningKey;
use linkbridge_authn::{
    Algorithm, AuthError, KeyRing, REJECTION_MESSAGE, RejectReason, RequestSigner,
    RequestVerifier, SignatureConfig, SigningKey,
};
use proptest::prelude::*;
use rand_core::OsRng;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NOW: i64 = 1_700_000_000;

fn at(offset: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(NOW + offset, 0).unwrap()
}

fn hmac_config(secret: &str) -> SignatureConfig {
    SignatureConfig::builder().secret(secret).build().unwrap()
}

fn request(path: &str, body: &[u8]) -> http::Request<Bytes> {
    http::Request::post(path)
        .header("x-application-authorization", "Bearer abc")
        .body(Bytes::copy_from_slice(body))
        .unwrap()
}

fn signed(config: &SignatureConfig, path: &str, body: &[u8]) -> http::Request<Bytes> {
    let mut req = request(path, body);
    RequestSigner::from_config(config).unwrap().sign_at(&mut req, at(0)).unwrap();
    req
}

fn reject_reason(result: Result<impl std::fmt::Debug, AuthError>) -> RejectReason {
    match result {
        Err(AuthError::Rejected(rejection)) => rejection.reason(),
        other => panic!("expected rejection, got: {other:?}"),
    }
}

fn header(req: &http::Request<Bytes>, name: &str) -> String {
    req.headers()[name].to_str().unwrap().to_owned()
}

fn set_header(req: &mut http::Request<Bytes>, name: &'static str, value: &str) {
    req.headers_mut().insert(name, value.parse().unwrap());
}

// ---------------------------------------------------------------------------
// Tampering
// ---------------------------------------------------------------------------

#[test]
fn test_algorithm_substitution_rejected() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();
    let mut req = signed(&config, "/notify/C1", b"{}");

    let input = header(&req, "signature-input").replace("hmac-sha256", "ed25519");
    set_header(&mut req, "signature-input", &input);

    assert_eq!(reject_reason(verifier.verify_at(&req, at(1))), RejectReason::BadSignature);
}

#[test]
fn test_extended_expiry_rejected() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();
    let mut req = signed(&config, "/notify/C1", b"{}");

    let expires = NOW + 60;
    let input = header(&req, "signature-input")
        .replace(&format!("expires={expires}"), &format!("expires={}", expires + 3600));
    set_header(&mut req, "signature-input", &input);

    assert_eq!(reject_reason(verifier.verify_at(&req, at(120))), RejectReason::BadSignature);
}

#[test]
fn test_peer_signed_long_expiry_bounded_by_local_ttl() {
    let peer = SignatureConfig::builder()
        .secret("shared")
        .ttl(std::time::Duration::from_secs(86_400))
        .build()
        .unwrap();
    let verifier = RequestVerifier::from_config(&hmac_config("shared")).unwrap();
    let req = signed(&peer, "/notify/C1", b"{}");

    assert!(verifier.verify_at(&req, at(60)).is_ok());
    assert_eq!(reject_reason(verifier.verify_at(&req, at(61))), RejectReason::Expired);
    assert_eq!(reject_reason(verifier.verify_at(&req, at(3_600))), RejectReason::Expired);
}

#[test]
fn test_signature_transplanted_to_other_path_rejected() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();
    let original = signed(&config, "/notify/C1", b"{}");

    let mut forged = request("/notify/C2", b"{}");
    for name in ["signature-input", "signature", "content-digest"] {
        set_header(&mut forged, name, &header(&original, name));
    }

    assert_eq!(reject_reason(verifier.verify_at(&forged, at(1))), RejectReason::BadSignature);
}

#[test]
fn test_dropping_covered_component_rejected() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();

    // A sender that covers less than the verifier expects.
    let weak = SignatureConfig::builder()
        .secret("shared")
        .covered_components(vec!["@method".into()])
        .build()
        .unwrap();
    let req = signed(&weak, "/notify/C1", b"{}");

    assert_eq!(reject_reason(verifier.verify_at(&req, at(1))), RejectReason::BadSignature);
}

#[test]
fn test_altered_covered_header_rejected() {
    let config = SignatureConfig::builder()
        .secret("shared")
        .covered_components(vec![
            "@method".into(),
            "@request-target".into(),
            "content-digest".into(),
            "x-application-authorization".into(),
        ])
        .build()
        .unwrap();
    let verifier = RequestVerifier::from_config(&config).unwrap();
    let mut req = signed(&config, "/notify/C1", b"{}");
    assert!(verifier.verify_at(&req, at(1)).is_ok());

    set_header(&mut req, "x-application-authorization", "Bearer stolen");
    assert_eq!(reject_reason(verifier.verify_at(&req, at(1))), RejectReason::BadSignature);
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[test]
fn test_key_rotation_accepts_old_and_new() {
    let old = hmac_config("old-secret");
    let new = SignatureConfig::builder().secret("new-secret").key_id("parabol-2").build().unwrap();
    let ring = KeyRing::new()
        .with_key("parabol", SigningKey::hmac("old-secret").unwrap().verifying_key())
        .with_key("parabol-2", SigningKey::hmac("new-secret").unwrap().verifying_key());
    let verifier = RequestVerifier::from_config(&new).unwrap().with_key_ring(ring);

    assert!(verifier.verify_at(&signed(&old, "/notify/C1", b"{}"), at(1)).is_ok());
    let verified = verifier.verify_at(&signed(&new, "/notify/C1", b"{}"), at(1)).unwrap();
    assert_eq!(verified.key_id, "parabol-2");
}

#[test]
fn test_peer_label_verified_through_verify_label() {
    let peer = SignatureConfig::builder().secret("shared").label("parabol").build().unwrap();
    let req = signed(&peer, "/notify/C1", b"{}");

    let default = RequestVerifier::from_config(&hmac_config("shared")).unwrap();
    assert_eq!(reject_reason(default.verify_at(&req, at(1))), RejectReason::MissingSignature);

    let local =
        SignatureConfig::builder().secret("shared").verify_label("parabol").build().unwrap();
    let verifier = RequestVerifier::from_config(&local).unwrap();
    assert!(verifier.verify_at(&req, at(1)).is_ok());

    let mut outbound = request("/graphql", b"{}");
    RequestSigner::from_config(&local).unwrap().sign_at(&mut outbound, at(0)).unwrap();
    assert!(header(&outbound, "signature-input").starts_with("sig1="));
}

#[test]
fn test_unknown_key_and_bad_signature_look_identical_outside() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();

    let unknown = SignatureConfig::builder().secret("shared").key_id("intruder").build().unwrap();
    let wrong = hmac_config("guess");

    let a = verifier.verify_at(&signed(&unknown, "/notify/C1", b"{}"), at(1)).unwrap_err();
    let b = verifier.verify_at(&signed(&wrong, "/notify/C1", b"{}"), at(1)).unwrap_err();

    assert_eq!(a.reject_reason(), Some(RejectReason::UnknownKey));
    assert_eq!(b.reject_reason(), Some(RejectReason::BadSignature));
    assert_eq!(a.to_string(), REJECTION_MESSAGE);
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn test_ed25519_round_trip_with_public_key_only() {
    let key = DalekSigningKey::generate(&mut OsRng);
    let signer_config = SignatureConfig::builder()
        .secret(STANDARD.encode(key.to_bytes()))
        .algorithm(Algorithm::Ed25519)
        .build()
        .unwrap();
    let verifier_config = SignatureConfig::builder()
        .secret("")
        .public_key(STANDARD.encode(key.verifying_key().to_bytes()))
        .algorithm(Algorithm::Ed25519)
        .build()
        .unwrap();
    let verifier = RequestVerifier::from_config(&verifier_config).unwrap();

    let req = signed(&signer_config, "/notify/C1", b"{\"ok\":true}");
    assert!(verifier.verify_at(&req, at(1)).is_ok());

    let other = DalekSigningKey::generate(&mut OsRng);
    let impostor = SignatureConfig::builder()
        .secret(STANDARD.encode(other.to_bytes()))
        .algorithm(Algorithm::Ed25519)
        .build()
        .unwrap();
    let forged = signed(&impostor, "/notify/C1", b"{\"ok\":true}");
    assert_eq!(reject_reason(verifier.verify_at(&forged, at(1))), RejectReason::BadSignature);
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[test]
fn test_malformed_headers_are_missing_signature() {
    let config = hmac_config("shared");
    let verifier = RequestVerifier::from_config(&config).unwrap();
    let cases: &[(&'static str, &str)] = &[
        ("signature", "sig1=not-a-byte-sequence"),
        ("signature", "sig1=:%%%:"),
        ("signature", "other=:AAAA:"),
        ("signature-input", "sig1=\"@method\""),
        ("signature-input", "sig2=(\"@method\");created=1;keyid=\"parabol\""),
        ("signature-input", "sig1=(\"@method\");keyid=\"parabol\""),
    ];
    for (name, value) in cases {
        let mut req = signed(&config, "/notify/C1", b"{}");
        req.headers_mut().insert(*name, value.parse().unwrap());
        assert_eq!(
            reject_reason(verifier.verify_at(&req, at(1))),
            RejectReason::MissingSignature,
            "{name}: {value}"
        );
    }
}

proptest! {
    #[test]
    fn sign_then_verify_accepts_within_ttl(
        path in "/[a-zA-Z0-9_-]{1,20}(/[a-zA-Z0-9_-]{1,20}){0,3}",
        body in proptest::collection::vec(any::<u8>(), 0..256),
        elapsed in 0i64..=60,
    ) {
        let config = hmac_config("shared");
        let verifier = RequestVerifier::from_config(&config).unwrap();
        let req = signed(&config, &path, &body);
        prop_assert!(verifier.verify_at(&req, at(elapsed)).is_ok());
    }

    #[test]
    fn verify_rejects_after_ttl(elapsed in 61i64..100_000) {
        let config = hmac_config("shared");
        let verifier = RequestVerifier::from_config(&config).unwrap();
        let req = signed(&config, "/notify/C1", b"{}");
        let result = verifier.verify_at(&req, at(elapsed));
        prop_assert_eq!(reject_reason(result), RejectReason::Expired);
    }

    #[test]
    fn any_body_change_rejected(
        body in proptest::collection::vec(any::<u8>(), 1..128),
        flip in any::<proptest::sample::Index>(),
    ) {
        let config = hmac_config("shared");
        let verifier = RequestVerifier::from_config(&config).unwrap();
        let mut req = signed(&config, "/notify/C1", &body);

        let mut tampered = body.clone();
        let i = flip.index(tampered.len());
        tampered[i] ^= 0x01;
        *req.body_mut() = Bytes::from(tampered);

        prop_assert_eq!(reject_reason(verifier.verify_at(&req, at(1))), RejectReason::BadSignature);
    }
}
