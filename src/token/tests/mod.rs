
use super::*;
use crate::{
    builder::TokenBuilder,
    cache::MemoryCache,
    provider::{SecretResolutionError, StaticSecret},
};
use fixtures::*;
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

fn issue_example(clock: Arc<MockTimeProvider>) -> String {
    TokenBuilder::with_algorithm("sha256")
        .expect("algorithm rejected")
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .payload(hello_world())
        .expires_in(Duration::from_secs(5))
        .time_provider(clock)
        .issue(&StaticSecret::checked(SECRET).expect("weak secret"))
        .expect("issue failed")
}

#[test]
fn issue_and_validate() {
    let clock = MockTimeProvider::at(NOW);
    let token = issue_example(clock.clone());

    let mut token = Token::init(&token).expect("parse failed").with_time_provider(clock);
    assert_eq!(token.state(), TokenState::Parsed);

    let claims = token.validate(&StaticSecret::new(SECRET)).expect("validation failed");
    assert_eq!(claims.get("hello"), Some(&json!("world")));
    assert_eq!(claims.issued_at(), Some(timestamp(NOW)));
    assert_eq!(claims.expires_at(), Some(timestamp(NOW + 5)));
    assert_eq!(claims.id().map(str::len), Some(32));
    assert_eq!(claims.len(), 6);

    assert!(token.is_validated());
    assert_eq!(token.issuer().unwrap(), Some(ISSUER));
    assert_eq!(token.audience().unwrap(), Some(AUDIENCE.into()));
}

#[test]
fn issuer_and_audience_are_optional() {
    let token = TokenBuilder::new().issue(&StaticSecret::new(SECRET)).expect("issue failed");
    let mut token = Token::init(&token).expect("parse failed");
    token.validate(&StaticSecret::new(SECRET)).expect("validation failed");
    assert_eq!(token.issuer().unwrap(), None);
    assert_eq!(token.audience().unwrap(), None);
}

#[test]
fn custom_header_fields() {
    let token = TokenBuilder::new().key_id("k1").issue(&StaticSecret::new(SECRET)).expect("issue failed");
    let token = Token::init(&token).expect("parse failed");
    assert_eq!(token.header().kid.as_deref(), Some("k1"));
    assert!(!token.has_kms_header());
}

#[test]
fn wrong_secret() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let mut token = Token::init(&token).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));
    let err = token.validate(&StaticSecret::new("other-01-secret")).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::SignatureVerificationFailed));
    assert_eq!(token.state(), TokenState::Rejected(Rejection::InvalidSignature));
}

#[test]
fn invalid_signature() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let signature = token.rsplit('.').next().expect("no signature");
    for index in 0..signature.len() {
        let mut tampered = signature.as_bytes().to_vec();
        tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        let tampered = replace_segment(&token, 2, &tampered);

        let mut tampered = Token::init(&tampered).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));
        let err = tampered.validate(&StaticSecret::new(SECRET)).expect_err("validation succeeded");
        assert!(matches!(err, TokenError::SignatureVerificationFailed), "index {index}: {err}");
    }
}

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[rstest]
#[case::single_padding(|signature: &str| format!("{signature}="))]
#[case::double_padding(|signature: &str| format!("{signature}=="))]
#[case::padding_only(|_: &str| "=".to_string())]
#[case::non_canonical_trailing_bits(|signature: &str| {
    // The last character of a 32 byte signature carries two unused bits.
    let mut signature = signature.to_string();
    let last = signature.pop().expect("empty signature");
    let position = ALPHABET.find(last).expect("not base64url");
    signature.push(ALPHABET.as_bytes()[position ^ 1] as char);
    signature
})]
fn non_canonical_signature(#[case] modify: fn(&str) -> String) {
    let token = issue_example(MockTimeProvider::at(NOW));
    let signature = token.rsplit('.').next().expect("no signature");
    let tampered = replace_segment(&token, 2, &modify(signature));
    assert_ne!(tampered, token);

    let mut tampered = Token::init(&tampered).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));
    let err = tampered.validate(&StaticSecret::new(SECRET)).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::SignatureVerificationFailed), "{err}");
    assert_eq!(tampered.state(), TokenState::Rejected(Rejection::InvalidSignature));
}

#[test]
fn single_bit_flips() {
    let token = issue_example(MockTimeProvider::at(NOW));
    for index in 0..token.len() {
        // The top bit is left alone so every mutation stays valid UTF-8.
        for bit in 0..7 {
            let mut tampered = token.as_bytes().to_vec();
            tampered[index] ^= 1 << bit;
            let tampered = String::from_utf8(tampered).expect("invalid UTF-8");

            let mut tampered = match Token::init(&tampered) {
                Ok(tampered) => tampered.with_time_provider(MockTimeProvider::at(NOW)),
                Err(err) => {
                    assert!(matches!(err, TokenError::Malformed(_)), "index {index}, bit {bit}: {err}");
                    continue;
                }
            };
            let err = tampered.validate(&StaticSecret::new(SECRET)).expect_err("validation succeeded");
            assert!(matches!(err, TokenError::SignatureVerificationFailed), "index {index}, bit {bit}: {err}");
        }
    }
}

#[rstest]
#[case::issuer(1, |value: &mut serde_json::Value| value["iss"] = json!("mallory"))]
#[case::expiry(1, |value: &mut serde_json::Value| value["exp"] = json!(0))]
#[case::extra_claim(1, |value: &mut serde_json::Value| value["admin"] = json!(true))]
#[case::token_type(0, |value: &mut serde_json::Value| value["typ"] = json!("XYZ"))]
#[case::key_id(0, |value: &mut serde_json::Value| value["kid"] = json!("k2"))]
fn tampered_segments(#[case] index: usize, #[case] modify: fn(&mut serde_json::Value)) {
    let token = issue_example(MockTimeProvider::at(NOW));
    let tampered = modify_segment(&token, index, modify);

    let mut tampered = Token::init(&tampered).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));
    let err = tampered.validate(&StaticSecret::new(SECRET)).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::SignatureVerificationFailed));
}

#[test]
fn claims_hidden_before_validation() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let token = Token::init(&token).expect("parse failed");
    assert!(matches!(token.payload(), Err(TokenError::NotValidated)));
    assert!(matches!(token.issuer(), Err(TokenError::NotValidated)));
    assert!(matches!(token.audience(), Err(TokenError::NotValidated)));
    assert_eq!(token.header().typ, "JWT");
    assert!(matches!(token.into_payload(), Err(TokenError::NotValidated)));
}

#[test]
fn claims_hidden_after_rejection() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let mut token = Token::init(&token).expect("parse failed");
    token.validate(&StaticSecret::new("other-01-secret")).expect_err("validation succeeded");
    assert!(matches!(token.payload(), Err(TokenError::NotValidated)));
}

#[test]
fn revalidation() {
    let clock = MockTimeProvider::at(NOW);
    let token = issue_example(clock.clone());
    let mut token = Token::init(&token).expect("parse failed").with_time_provider(clock);
    let provider = StaticSecret::new(SECRET);

    let first = token.validate(&provider).expect("validation failed").clone();
    let second = token.validate(&provider).expect("revalidation failed").clone();
    assert_eq!(first, second);
    assert_eq!(token.into_payload().expect("not validated"), first);
}

#[test]
fn rejection_is_final() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let mut token = Token::init(&token).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));
    token.validate(&StaticSecret::new("other-01-secret")).expect_err("validation succeeded");

    let err = token.validate(&StaticSecret::new(SECRET)).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::SignatureVerificationFailed));
}

#[test]
fn unresolvable_secret_reaches_no_verdict() {
    let token = issue_example(MockTimeProvider::at(NOW));
    let mut token = Token::init(&token).expect("parse failed").with_time_provider(MockTimeProvider::at(NOW));

    let kms = CountingKms::new();
    let err = token.validate(&kms_provider(&kms, Arc::new(MemoryCache::new()))).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::SecretResolution(SecretResolutionError::MissingDescriptor)));
    assert_eq!(token.state(), TokenState::Parsed);

    token.validate(&StaticSecret::new(SECRET)).expect("validation failed");
}

#[test]
fn parse_from_str() {
    let token: Token = issue_example(MockTimeProvider::at(NOW)).parse().expect("parse failed");
    assert_eq!(token.state(), TokenState::Parsed);
}

#[rstest]
#[case::empty("", |e: &ParseTokenError| matches!(e, ParseTokenError::SegmentCount(1)))]
#[case::two_segments("a.b", |e: &ParseTokenError| matches!(e, ParseTokenError::SegmentCount(2)))]
#[case::four_segments("a.b.c.d", |e: &ParseTokenError| matches!(e, ParseTokenError::SegmentCount(4)))]
#[case::header_base64("!!.e30.AA", |e: &ParseTokenError| matches!(e, ParseTokenError::Base64("header", _)))]
#[case::header_json("bm90IGpzb24.e30.AA", |e: &ParseTokenError| matches!(e, ParseTokenError::Json("header", _)))]
#[case::unsupported_algorithm("eyJhbGciOiJub25lIn0.e30.AA", |e: &ParseTokenError| matches!(e, ParseTokenError::Json("header", _)))]
#[case::claims_base64("eyJhbGciOiJIUzI1NiJ9.!!.AA", |e: &ParseTokenError| matches!(e, ParseTokenError::Base64("claims", _)))]
#[case::claims_not_object("eyJhbGciOiJIUzI1NiJ9.WzFd.AA", |e: &ParseTokenError| matches!(e, ParseTokenError::Json("claims", _)))]
#[case::expiry_not_numeric(
    "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOiJzb29uIn0.AA",
    |e: &ParseTokenError| matches!(e, ParseTokenError::InvalidClaim("exp"))
)]
fn malformed_tokens(#[case] input: &str, #[case] check: fn(&ParseTokenError) -> bool) {
    match Token::init(input).expect_err("parse succeeded") {
        TokenError::Malformed(err) => assert!(check(&err), "unexpected error: {err}"),
        err => panic!("unexpected error: {err}"),
    }
}

#[test]
fn null_expiry_is_accepted() {
    let token = TokenBuilder::new().claim("exp", json!(null)).issue(&StaticSecret::new(SECRET)).expect("issue failed");
    let mut token = Token::init(&token).expect("parse failed");
    token.validate(&StaticSecret::new(SECRET)).expect("validation failed");
}

#[test]
fn token_too_large() {
    let token = TokenBuilder::new()
        .claim("padding", "a".repeat(DEFAULT_MAX_TOKEN_SIZE))
        .issue(&StaticSecret::new(SECRET))
        .expect("issue failed");
    let err = Token::init(&token).expect_err("parse succeeded");
    assert!(matches!(err, TokenError::Malformed(ParseTokenError::TooLarge(_))));

    let parameters = DecodeParameters { max_token_size: token.len() };
    Token::init_with(&token, &parameters).expect("parse failed");
}

#[test]
fn example_scenario() {
    let clock = MockTimeProvider::at(NOW);
    let token = issue_example(clock.clone());
    let provider = StaticSecret::new(SECRET);

    let mut parsed = Token::init(&token).expect("parse failed").with_time_provider(clock.clone());
    let claims = parsed.validate(&provider).expect("validation failed");
    assert_eq!(claims.issuer(), Some(ISSUER));
    assert_eq!(claims.get("hello"), Some(&json!("world")));

    clock.advance(6);
    let mut parsed = Token::init(&token).expect("parse failed").with_time_provider(clock);
    let err = parsed.validate(&provider).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::TokenExpired));
}

#[test]
#[ignore = "sleeps for several seconds"]
fn example_scenario_wall_clock() {
    let provider = StaticSecret::new(SECRET);
    let token = TokenBuilder::new()
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .payload(hello_world())
        .expires_in(Duration::from_secs(5))
        .issue(&provider)
        .expect("issue failed");

    let mut parsed = Token::init(&token).expect("parse failed");
    parsed.validate(&provider).expect("validation failed");

    std::thread::sleep(Duration::from_secs(6));
    let mut parsed = Token::init(&token).expect("parse failed");
    let err = parsed.validate(&provider).expect_err("validation succeeded");
    assert!(matches!(err, TokenError::TokenExpired));
}
