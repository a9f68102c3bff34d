//! End-to-end properties of the claims protocol
//!
//! Sign, verify, expire and revoke through the public API only.

mod common;

use chrono::Duration as ChronoDuration;
use sigil_claims::b64url;
use sigil_claims::token::{self, MAX_HEADER_SEGMENT_LEN};
use sigil_claims::{
    Claim, ClaimRepositoryData, ClaimRepositoryStatus, IdentityClaim, SigningAlgorithm,
};
use std::time::Duration;

use common::{manager, manager_with, HOUR};

fn user_42(manager: &sigil_claims::ClaimManager) -> ClaimRepositoryData {
    ClaimRepositoryData::new(IdentityClaim::new("user-42"), manager.now() + ChronoDuration::hours(1))
        .with_claim(Claim::typed("role", "admin").unwrap())
}

#[test]
fn test_scenario_valid_within_the_hour() {
    common::init_tracing();
    let (clock, manager) = manager();
    let token = manager.serialize(&mut user_42(&manager)).unwrap();

    clock.advance(Duration::from_secs(59 * 60));
    let outcome = manager.deserialize(&token);
    assert!(outcome.is_valid());
    let data = outcome.data.unwrap();
    assert_eq!(data.claim("role").unwrap().get::<String>().unwrap(), "admin");
}

#[test]
fn test_scenario_expired_after_the_hour() {
    // Session TTL outlives the token so only the embedded expiration fires
    let (clock, manager) = manager_with(SigningAlgorithm::Hs256, HOUR * 2);
    let token = manager.serialize(&mut user_42(&manager)).unwrap();

    clock.advance(HOUR + Duration::from_secs(1));
    let outcome = manager.deserialize(&token);
    assert_eq!(outcome.status, ClaimRepositoryStatus::Expired);
    assert_eq!(
        outcome.data.unwrap().identity.raw_value(),
        Some("user-42")
    );
}

#[test]
fn test_scenario_expired_after_session_ttl() {
    let (clock, manager) = manager();
    let token = manager.serialize(&mut user_42(&manager)).unwrap();

    clock.advance(HOUR + Duration::from_secs(1));
    let outcome = manager.deserialize(&token);
    assert_eq!(outcome.status, ClaimRepositoryStatus::Expired);
    assert!(outcome.data.is_some());
}

#[test]
fn test_scenario_revoked_before_the_hour() {
    let (clock, manager) = manager();
    let token = manager.serialize(&mut user_42(&manager)).unwrap();

    clock.advance(Duration::from_secs(10 * 60));
    assert!(manager.revoke("user-42"));
    let outcome = manager.deserialize(&token);
    assert_eq!(outcome.status, ClaimRepositoryStatus::Expired);
    assert_eq!(outcome.data.unwrap().identity.raw_value(), Some("user-42"));
}

#[test]
fn test_determinism() {
    let (_, manager) = manager();
    let data = user_42(&manager);
    let a = manager.serialize(&mut data.clone()).unwrap();
    let b = manager.serialize(&mut data.clone()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_round_trip_preserves_order_and_raw_values() {
    let (_, manager) = manager();
    let mut data = ClaimRepositoryData::new(IdentityClaim::typed(&42u64).unwrap(), manager.now() + ChronoDuration::minutes(5))
        .with_claim(Claim::typed("role", "admin").unwrap())
        .with_claim(Claim::typed("age", &37).unwrap())
        .with_claim(Claim::typed("tags", &["a", "b"]).unwrap())
        .with_claim(Claim::raw("note", "has \"quotes\" and ünïcödé"));
    let token = manager.serialize(&mut data).unwrap();
    assert!(token.is_ascii());

    let parsed = manager.deserialize(&token).data.unwrap();
    assert_eq!(parsed.identity.get::<u64>().unwrap(), 42);
    assert_eq!(parsed.expiration, data.expiration);
    let raw: Vec<_> = parsed
        .claims
        .iter()
        .map(|c| (c.subject(), c.raw_value().unwrap()))
        .collect();
    assert_eq!(
        raw,
        [
            ("role", "admin"),
            ("age", "37"),
            ("tags", r#"["a","b"]"#),
            ("note", "has \"quotes\" and ünïcödé"),
        ]
    );
}

#[test]
fn test_every_signature_byte_flip_is_invalid() {
    let (_, manager) = manager();
    let token = manager.serialize(&mut user_42(&manager)).unwrap();
    let parts = token::split(&token).unwrap();
    let signature = b64url::decode(parts.signature.as_bytes()).unwrap();

    for i in 0..signature.len() {
        let mut flipped = signature.clone();
        flipped[i] ^= 0x01;
        let forged = format!("{}.{}", parts.signed, b64url::encode(&flipped));
        assert_eq!(
            manager.deserialize(&forged).status,
            ClaimRepositoryStatus::Invalid,
            "flip at byte {i}"
        );
    }
}

#[test]
fn test_format_rejections() {
    let (_, manager) = manager();
    let token = manager.serialize(&mut user_42(&manager)).unwrap();
    let parts = token::split(&token).unwrap();

    let unsupported = format!(
        "{}.{}.{}",
        b64url::encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        parts.payload,
        parts.signature
    );
    let non_ascii = format!("{}.{}.{}ß", parts.header, parts.payload, parts.signature);
    let oversized = format!(
        "{}.{}.{}",
        b64url::encode(&[b' '; MAX_HEADER_SEGMENT_LEN]),
        parts.payload,
        parts.signature
    );

    for bad in [unsupported, non_ascii, oversized] {
        let outcome = manager.deserialize(&bad);
        assert_eq!(outcome.status, ClaimRepositoryStatus::Invalid);
        assert!(outcome.data.is_none());
    }
}

#[test]
fn test_tokens_do_not_cross_servers() {
    let (_, a) = manager();
    let (_, b) = manager();
    let token = a.serialize(&mut user_42(&a)).unwrap();
    // Same identity on b, but a different session secret
    b.serialize(&mut user_42(&b)).unwrap();
    assert_eq!(b.deserialize(&token).status, ClaimRepositoryStatus::Invalid);
}

#[test]
fn test_wire_format() {
    let (_, manager) = manager();
    let mut data = user_42(&manager);
    let token = manager.serialize(&mut data).unwrap();
    let parts = token::split(&token).unwrap();

    let header: serde_json::Value =
        serde_json::from_slice(&b64url::decode(parts.header.as_bytes()).unwrap()).unwrap();
    assert_eq!(header, serde_json::json!({"alg": "HS256", "typ": "JWT"}));

    let payload: serde_json::Value =
        serde_json::from_slice(&b64url::decode(parts.payload.as_bytes()).unwrap()).unwrap();
    assert_eq!(
        payload["IdentityClaim"],
        serde_json::json!({"Subject": "identity", "RawValue": "user-42"})
    );
    assert_eq!(
        payload["Claims"],
        serde_json::json!([{"Subject": "role", "RawValue": "admin"}])
    );
    assert!(payload["ExpirationDate"].is_string());
    assert_eq!(b64url::decode(parts.signature.as_bytes()).unwrap().len(), 32);
}
