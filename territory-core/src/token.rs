//! Signed activation tokens for the cross-application handoff.
//!
//! A token is a stateless, unencrypted bearer credential:
//! `base64(payload_json) + "." + hex(hmac_sha256(base64_payload, secret))`.
//! The payload is visible to anyone holding the token; only tampering is
//! prevented. Expiry is advisory and checked by the consumer.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime, after which the consumer must reject it.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    InvalidKey,
}

/// Payload carried by an activation token.
///
/// `extra` holds flow-specific fields (e.g. a claimed auction id) and is
/// flattened into the JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationClaims {
    pub uid: Uuid,
    pub email: String,
    pub name: String,
    pub credits: i64,
    /// Unix timestamp after which the token is stale.
    pub exp: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Build and sign an activation token for the given user identity.
pub fn generate_activation_token(
    secret: &str,
    uid: Uuid,
    email: &str,
    name: &str,
    credits: i64,
    extra: serde_json::Map<String, serde_json::Value>,
) -> Result<String, TokenError> {
    let claims = ActivationClaims {
        uid,
        email: email.to_string(),
        name: name.to_string(),
        credits,
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        extra,
    };
    sign_claims(secret, &claims)
}

/// Sign an explicit claims struct. Split out so tests can control `exp`.
pub fn sign_claims(secret: &str, claims: &ActivationClaims) -> Result<String, TokenError> {
    let json = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
    let encoded = URL_SAFE_NO_PAD.encode(json);
    let signature = compute_signature(secret, encoded.as_bytes())?;
    Ok(format!("{}.{}", encoded, signature))
}

/// Verify a token's signature and expiry and return its claims.
///
/// The consumer lives in the main app; this verifier exists so both sides
/// agree on the format and so the signer can be tested end to end.
pub fn verify_activation_token(secret: &str, token: &str) -> Result<ActivationClaims, TokenError> {
    let (encoded, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;

    let expected = compute_signature(secret, encoded.as_bytes())?;
    let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
    if !matches {
        return Err(TokenError::InvalidSignature);
    }

    let json = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| TokenError::Malformed)?;
    let claims: ActivationClaims =
        serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

    if claims.exp < Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn compute_signature(secret: &str, payload: &[u8]) -> Result<String, TokenError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::InvalidKey)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "handoff_test_secret";

    fn sample_claims(exp: i64) -> ActivationClaims {
        ActivationClaims {
            uid: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
            name: "Test Buyer".to_string(),
            credits: 100,
            exp,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn round_trip_preserves_claims() {
        let claims = sample_claims((Utc::now() + Duration::hours(1)).timestamp());
        let token = sign_claims(SECRET, &claims).unwrap();
        let decoded = verify_activation_token(SECRET, &token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn generate_sets_future_expiry() {
        let token = generate_activation_token(
            SECRET,
            Uuid::new_v4(),
            "buyer@example.com",
            "Test Buyer",
            100,
            serde_json::Map::new(),
        )
        .unwrap();
        let claims = verify_activation_token(SECRET, &token).unwrap();
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let claims = sample_claims((Utc::now() + Duration::hours(1)).timestamp());
        let token = sign_claims(SECRET, &claims).unwrap();

        let (encoded, signature) = token.split_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        // Bump the credit grant inside the payload.
        let json = String::from_utf8(bytes.clone())
            .unwrap()
            .replace("\"credits\":100", "\"credits\":999");
        bytes = json.into_bytes();
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(bytes), signature);

        assert!(matches!(
            verify_activation_token(SECRET, &forged),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = sample_claims((Utc::now() + Duration::hours(1)).timestamp());
        let token = sign_claims(SECRET, &claims).unwrap();
        assert!(matches!(
            verify_activation_token("other_secret", &token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = sample_claims((Utc::now() - Duration::hours(1)).timestamp());
        let token = sign_claims(SECRET, &claims).unwrap();
        assert!(matches!(
            verify_activation_token(SECRET, &token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn extra_fields_survive_the_round_trip() {
        let mut extra = serde_json::Map::new();
        extra.insert("auction_id".to_string(), serde_json::json!("9934821"));
        let claims = ActivationClaims {
            extra,
            ..sample_claims((Utc::now() + Duration::hours(1)).timestamp())
        };
        let token = sign_claims(SECRET, &claims).unwrap();
        let decoded = verify_activation_token(SECRET, &token).unwrap();
        assert_eq!(
            decoded.extra.get("auction_id"),
            Some(&serde_json::json!("9934821"))
        );
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(matches!(
            verify_activation_token(SECRET, "not-a-token"),
            Err(TokenError::Malformed)
        ));
    }
}
