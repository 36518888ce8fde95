//! Signed, time-bounded identity claims in the compact JWT encoding.
//!
//! There is no server-side revocation: a token stays valid until `exp`, even
//! after logout or a role change. The signing key is generated per process, so
//! a restart invalidates everything outstanding.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;
use crate::user::Role;

pub const ALGORITHM: Algorithm = Algorithm::HS256;

const SECRET_LEN: usize = 32;

pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn generate() -> Self {
        let mut secret = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret(&secret)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("SigningKey(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    /// Snapshot at issue time; may be stale by the time it's read.
    pub role: Role,
    pub issued_at: Option<Timestamp>,
    pub expiry: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("no token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("token lacks a required claim")]
    ClaimMissing,
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("clock unavailable")]
    Clock,
    #[error("encoding token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

// every field optional so absence is reported as ClaimMissing, not a parse failure
#[derive(Debug, Default, Deserialize, Serialize)]
struct WireClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

pub fn issue(
    key: &SigningKey,
    subject: &str,
    role: Role,
    ttl: ::time::Duration,
) -> Result<String, IssueError> {
    let now = Timestamp::now().map_err(|()| IssueError::Clock)?;
    issue_at(key, subject, role, ttl, now)
}

pub fn issue_at(
    key: &SigningKey,
    subject: &str,
    role: Role,
    ttl: ::time::Duration,
    now: Timestamp,
) -> Result<String, IssueError> {
    let claims = WireClaims {
        sub: Some(subject.into()),
        role: Some(role.as_str().into()),
        iat: Some(now.as_i64()),
        exp: Some(now.plus(ttl).as_i64()),
    };

    Ok(jsonwebtoken::encode(
        &Header::new(ALGORITHM),
        &claims,
        &key.encoding,
    )?)
}

pub fn decode(key: &SigningKey, token: &str) -> Result<Claims, TokenError> {
    let now = Timestamp::now().map_err(|()| {
        error!("no clock, treating token as expired");
        TokenError::Expired
    })?;
    decode_at(key, token, now)
}

/// A token is expired from the second named by `exp` onwards.
pub fn decode_at(key: &SigningKey, token: &str, now: Timestamp) -> Result<Claims, TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Missing);
    }

    // expiry and claim presence are checked below, against `now`
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<WireClaims>(token, &key.decoding, &validation)
        .map_err(|e| classify(e.kind()))?;

    let WireClaims { sub, role, iat, exp } = data.claims;

    let subject = sub.ok_or(TokenError::ClaimMissing)?;
    let role = role.ok_or(TokenError::ClaimMissing)?;
    let expiry = exp.map(Timestamp::from_i64).ok_or(TokenError::ClaimMissing)?;
    let role = role.parse().map_err(|()| TokenError::Malformed)?;

    if now >= expiry {
        return Err(TokenError::Expired);
    }

    Ok(Claims {
        subject,
        role,
        issued_at: iat.map(Timestamp::from_i64),
        expiry,
    })
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(_) => TokenError::ClaimMissing,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use ::time::Duration;

    pub fn test_key() -> SigningKey {
        SigningKey::from_secret(b"a fixed key, for reproducible tokens")
    }

    const NOW: i64 = 1_700_000_000;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_i64(secs)
    }

    #[test]
    fn round_trip() {
        let key = test_key();
        let token = issue_at(&key, "42", Role::Admin, Duration::days(1), at(NOW)).unwrap();

        assert_eq!(token.split('.').count(), 3);

        let claims = decode_at(&key, &token, at(NOW)).unwrap();
        assert_eq!(
            claims,
            Claims {
                subject: "42".into(),
                role: Role::Admin,
                issued_at: Some(at(NOW)),
                expiry: at(NOW + 86_400),
            }
        );
    }

    #[test]
    fn round_trip_with_real_clock() {
        let key = SigningKey::generate();
        let token = issue(&key, "7", Role::User, Duration::seconds(86_400)).unwrap();

        let claims = decode(&key, &token).unwrap();
        assert_eq!(claims.subject, "7");
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn fixed_key_is_deterministic() {
        let a = issue_at(&test_key(), "1", Role::User, Duration::hours(1), at(NOW)).unwrap();
        let b = issue_at(&test_key(), "1", Role::User, Duration::hours(1), at(NOW)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn expiry() {
        let key = test_key();

        let zero = issue_at(&key, "1", Role::User, Duration::ZERO, at(NOW)).unwrap();
        assert_eq!(decode_at(&key, &zero, at(NOW)), Err(TokenError::Expired));
        assert_eq!(decode_at(&key, &zero, at(NOW + 5)), Err(TokenError::Expired));

        let zero = issue(&key, "1", Role::User, Duration::ZERO).unwrap();
        assert_eq!(decode(&key, &zero), Err(TokenError::Expired));

        let hour = issue_at(&key, "1", Role::User, Duration::hours(1), at(NOW)).unwrap();
        assert!(decode_at(&key, &hour, at(NOW + 3_599)).is_ok());
        assert_eq!(decode_at(&key, &hour, at(NOW + 3_600)), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_signature() {
        const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

        let key = test_key();
        let token = issue_at(&key, "42", Role::User, Duration::days(1), at(NOW)).unwrap();
        let (body, signature) = token.rsplit_once('.').unwrap();

        for (i, c) in signature.char_indices() {
            let flipped = ALPHABET.chars().find(|&r| r != c).unwrap();
            let mut sig = signature.to_string();
            sig.replace_range(i..i + 1, &flipped.to_string());

            let tampered = format!("{body}.{sig}");
            assert_eq!(
                decode_at(&key, &tampered, at(NOW)),
                Err(TokenError::SignatureInvalid),
                "position {i}"
            );
        }
    }

    #[test]
    fn wrong_key() {
        let token = issue_at(&test_key(), "42", Role::User, Duration::days(1), at(NOW)).unwrap();
        let other = SigningKey::from_secret(b"some other key");

        assert_eq!(
            decode_at(&other, &token, at(NOW)),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn garbage() {
        let key = test_key();

        assert_eq!(decode_at(&key, "", at(NOW)), Err(TokenError::Missing));
        assert_eq!(decode_at(&key, "   ", at(NOW)), Err(TokenError::Missing));
        assert_eq!(decode_at(&key, "abc", at(NOW)), Err(TokenError::Malformed));
        assert_eq!(decode_at(&key, "a.b.c", at(NOW)), Err(TokenError::Malformed));
        assert_eq!(
            decode_at(&key, "Bearer abc.def.ghi", at(NOW)),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn missing_claims() {
        let key = test_key();
        let sign = |claims: &WireClaims| {
            jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &key.encoding).unwrap()
        };

        let no_role = sign(&WireClaims {
            sub: Some("1".into()),
            exp: Some(NOW + 60),
            ..Default::default()
        });
        assert_eq!(decode_at(&key, &no_role, at(NOW)), Err(TokenError::ClaimMissing));

        let no_sub = sign(&WireClaims {
            role: Some("user".into()),
            exp: Some(NOW + 60),
            ..Default::default()
        });
        assert_eq!(decode_at(&key, &no_sub, at(NOW)), Err(TokenError::ClaimMissing));

        let no_exp = sign(&WireClaims {
            sub: Some("1".into()),
            role: Some("user".into()),
            ..Default::default()
        });
        assert_eq!(decode_at(&key, &no_exp, at(NOW)), Err(TokenError::ClaimMissing));

        let odd_role = sign(&WireClaims {
            sub: Some("1".into()),
            role: Some("root".into()),
            exp: Some(NOW + 60),
            ..Default::default()
        });
        assert_eq!(decode_at(&key, &odd_role, at(NOW)), Err(TokenError::Malformed));
    }

    #[test]
    fn other_algorithm_rejected() {
        let key = test_key();
        let claims = WireClaims {
            sub: Some("1".into()),
            role: Some("admin".into()),
            exp: Some(NOW + 60),
            ..Default::default()
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"a fixed key, for reproducible tokens"),
        )
        .unwrap();

        assert_eq!(
            decode_at(&key, &token, at(NOW)),
            Err(TokenError::SignatureInvalid)
        );
    }
}
