use super::*;
use jsonwebtoken::{DecodingKey, Validation};
use std::collections::HashSet;

const PKCS8: &str = include_str!("../testdata/rsa-pkcs8.pem");
const PKCS1: &str = include_str!("../testdata/rsa-pkcs1.pem");
const EC: &str = include_str!("../testdata/ec-pkcs8.pem");

const ISSUER: &str = "registry-token-issuer";
const SERVICE: &str = "docker-registry";

fn mk_config() -> Config {
    Config {
        issuer: ISSUER.to_string(),
        key_id: DEFAULT_KEY_ID.to_string(),
        expiration: Duration::from_secs(300),
    }
}

fn mk_grant(name: &str, actions: &[&str]) -> AccessGrant {
    AccessGrant {
        kind: "repository".to_string(),
        name: name.to_string(),
        actions: actions.iter().map(ToString::to_string).collect(),
    }
}

fn decode(generator: &TokenGenerator, token: &str) -> jsonwebtoken::TokenData<Claims> {
    let pem = generator
        .public_key_pem()
        .expect("public key must encode");
    let key = DecodingKey::from_rsa_pem(pem.as_bytes()).expect("public key must parse");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[SERVICE]);
    validation.set_issuer(&[ISSUER]);
    jsonwebtoken::decode::<Claims>(token, &key, &validation).expect("token must verify")
}

#[test]
fn loads_pkcs8_and_pkcs1_keys() {
    let pkcs8 = TokenGenerator::from_pem(PKCS8, mk_config()).expect("PKCS#8 key must load");
    let pkcs1 = TokenGenerator::from_pem(PKCS1, mk_config()).expect("PKCS#1 key must load");

    // Both fixtures hold the same key.
    assert_eq!(
        pkcs8.public_key_pem().expect("public key must encode"),
        pkcs1.public_key_pem().expect("public key must encode"),
    );
}

#[test]
fn loads_key_from_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa-pkcs1.pem");
    TokenGenerator::from_file(path, mk_config()).expect("key file must load");
}

#[test]
fn rejects_missing_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/missing.pem");
    match TokenGenerator::from_file(path, mk_config()) {
        Err(Error::Key(KeyError::Read { .. })) => {}
        Err(error) => panic!("unexpected error: {error}"),
        Ok(_) => panic!("missing key file must not load"),
    }
}

#[test]
fn rejects_non_rsa_key() {
    assert!(matches!(
        TokenGenerator::from_pem(EC, mk_config()),
        Err(Error::Key(KeyError::Parse(_)))
    ));
}

#[test]
fn rejects_garbage() {
    assert!(matches!(
        TokenGenerator::from_pem("not a key", mk_config()),
        Err(Error::Key(KeyError::Parse(_)))
    ));
}

#[test]
fn rejects_zero_expiration() {
    let config = Config {
        expiration: Duration::ZERO,
        ..mk_config()
    };
    assert!(matches!(
        TokenGenerator::from_pem(PKCS8, config),
        Err(Error::Expiration(_))
    ));
}

#[test]
fn token_header_carries_key_id() {
    let generator = TokenGenerator::from_pem(PKCS8, mk_config()).expect("key must load");
    let (token, _) = generator
        .issue("tenant-a", SERVICE, vec![mk_grant("tenant-a/img", &["pull"])])
        .expect("token must sign");

    let header = jsonwebtoken::decode_header(&token).expect("header must decode");
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.typ.as_deref(), Some("JWT"));
    assert_eq!(header.kid.as_deref(), Some(DEFAULT_KEY_ID));
    assert_eq!(generator.key_id(), Some(DEFAULT_KEY_ID));
}

#[test]
fn custom_key_id() {
    let config = Config {
        key_id: "rotated-2024".to_string(),
        ..mk_config()
    };
    let generator = TokenGenerator::from_pem(PKCS1, config).expect("key must load");
    let (token, _) = generator
        .issue("tenant-a", SERVICE, vec![])
        .expect("token must sign");
    let header = jsonwebtoken::decode_header(&token).expect("header must decode");
    assert_eq!(header.kid.as_deref(), Some("rotated-2024"));
}

#[test]
fn token_claims() {
    let generator = TokenGenerator::from_pem(PKCS8, mk_config()).expect("key must load");
    let grants = vec![mk_grant("tenant-a/img", &["push", "pull"])];
    let before = Utc::now().timestamp();
    let (token, expires_at) = generator
        .issue("tenant-a", SERVICE, grants.clone())
        .expect("token must sign");
    let after = Utc::now().timestamp();

    let claims = decode(&generator, &token).claims;
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, "tenant-a");
    assert_eq!(claims.aud, [SERVICE]);
    assert_eq!(claims.exp - claims.iat, 300);
    assert!(before <= claims.iat && claims.iat <= after);
    assert_eq!(claims.exp, expires_at.timestamp());
    assert_eq!(claims.access, grants);
    assert!(uuid::Uuid::parse_str(&claims.jti).is_ok(), "{}", claims.jti);
}

#[test]
fn audience_is_serialized_as_array() {
    let generator = TokenGenerator::from_pem(PKCS8, mk_config()).expect("key must load");
    let (token, _) = generator
        .issue("tenant-a", SERVICE, vec![])
        .expect("token must sign");
    let pem = generator
        .public_key_pem()
        .expect("public key must encode");
    let key = DecodingKey::from_rsa_pem(pem.as_bytes()).expect("public key must parse");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[SERVICE]);
    let raw = jsonwebtoken::decode::<serde_json::Value>(&token, &key, &validation)
        .expect("payload must decode")
        .claims;
    assert_eq!(raw["aud"], serde_json::json!([SERVICE]));
    assert_eq!(raw["access"], serde_json::json!([]));
}

#[test]
fn token_ids_are_unique() {
    let generator = TokenGenerator::from_pem(PKCS8, mk_config()).expect("key must load");
    let ids = (0..32)
        .map(|_| {
            let (token, _) = generator
                .issue("tenant-a", SERVICE, vec![])
                .expect("token must sign");
            decode(&generator, &token).claims.jti
        })
        .collect::<HashSet<_>>();
    assert_eq!(ids.len(), 32);
}
