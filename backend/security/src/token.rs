//! Compact signed tokens carried in a message's `content`.
//!
//! Layout: `b64url(header).b64url(payload).b64url(signature)` where the
//! header is `{"alg":"RS512"}`. Instructions carry JSON claims; replies
//! carry the command output as raw UTF-8 text.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use tether_core::{Claims, TetherError, VerificationError};
use thiserror::Error;

/// Algorithm used for every token this agent signs.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS512;

/// Only RSA signatures verify against the trusted key. Anything else
/// (`none`, HMAC keyed with the public key, EC) is refused up front.
const ACCEPTED_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("claims are not serializable: {0}")]
    Claims(String),

    #[error("signature computation failed: {0}")]
    Crypto(String),
}

impl From<SigningError> for TetherError {
    fn from(e: SigningError) -> Self {
        TetherError::Signing(e.to_string())
    }
}

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// The master public key every incoming instruction must be signed by.
#[derive(Clone)]
pub struct TrustedKey {
    key: DecodingKey,
}

impl TrustedKey {
    pub fn from_pem(pem: &str) -> Result<Self, VerificationError> {
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(|key| Self { key })
            .map_err(|e| VerificationError::InvalidKey(e.to_string()))
    }
}

impl std::fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TrustedKey(..)")
    }
}

pub struct TokenCodec;

impl TokenCodec {
    /// Sign `claims` with RS512. The payload is the JSON encoding of `claims`.
    pub fn sign(claims: &Claims, key: &EncodingKey) -> Result<String, SigningError> {
        let payload = serde_json::to_vec(claims).map_err(|e| SigningError::Claims(e.to_string()))?;
        Self::sign_bytes(&payload, key)
    }

    /// Sign `text` with RS512, using its UTF-8 bytes as the payload unchanged.
    pub fn sign_text(text: &str, key: &EncodingKey) -> Result<String, SigningError> {
        Self::sign_bytes(text.as_bytes(), key)
    }

    fn sign_bytes(payload: &[u8], key: &EncodingKey) -> Result<String, SigningError> {
        let header = serde_json::to_vec(&TokenHeader {
            alg: "RS512".to_string(),
        })
        .map_err(|e| SigningError::Claims(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = crypto::sign(signing_input.as_bytes(), key, SIGNING_ALGORITHM)
            .map_err(|e| SigningError::Crypto(e.to_string()))?;

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Check `token` against the trusted key and return its JSON claims.
    pub fn verify(token: &str, trusted: &TrustedKey) -> Result<Claims, VerificationError> {
        let payload = Self::verify_payload(token, trusted)?;
        serde_json::from_slice(&payload).map_err(|e| VerificationError::InvalidPayload(e.to_string()))
    }

    /// Check `token` against the trusted key and return the raw payload bytes.
    pub fn verify_payload(token: &str, trusted: &TrustedKey) -> Result<Vec<u8>, VerificationError> {
        let mut parts = token.trim().split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VerificationError::Malformed(
                "expected three dot-separated segments".into(),
            ));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| VerificationError::Malformed(format!("header: {e}")))?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VerificationError::Malformed(format!("header: {e}")))?;

        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| ACCEPTED_ALGORITHMS.contains(alg))
            .ok_or_else(|| VerificationError::UnsupportedAlgorithm(header.alg.clone()))?;

        let signing_input = &token.trim()[..header_b64.len() + 1 + payload_b64.len()];
        let valid = crypto::verify(signature, signing_input.as_bytes(), &trusted.key, algorithm)
            .map_err(|e| VerificationError::Malformed(format!("signature: {e}")))?;
        if !valid {
            return Err(VerificationError::SignatureMismatch);
        }

        URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| VerificationError::Malformed(format!("payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        master_signing_key, master_trusted_key, MASTER_PUBLIC_PEM, OTHER_PRIVATE_PEM,
        OTHER_PUBLIC_PEM,
    };
    use serde_json::json;

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn sign_then_verify_returns_claims() {
        let claims = json!({"shell": "/get processes"});
        let token = TokenCodec::sign(&claims, &master_signing_key()).unwrap();
        assert_eq!(TokenCodec::verify(&token, &master_trusted_key()).unwrap(), claims);
    }

    #[test]
    fn plain_string_claims_round_trip() {
        let claims = json!("name: init, pid: 1, cpu_percent: 0.0\n");
        let token = TokenCodec::sign(&claims, &master_signing_key()).unwrap();
        assert_eq!(TokenCodec::verify(&token, &master_trusted_key()).unwrap(), claims);
    }

    #[test]
    fn text_payload_is_raw_output_bytes() {
        let token = TokenCodec::sign_text("root\n", &master_signing_key()).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(payload).unwrap(), b"root\n");
        assert_eq!(
            TokenCodec::verify_payload(&token, &master_trusted_key()).unwrap(),
            b"root\n"
        );
    }

    #[test]
    fn text_payload_is_not_json_claims() {
        let token = TokenCodec::sign_text("root\n", &master_signing_key()).unwrap();
        assert!(matches!(
            TokenCodec::verify(&token, &master_trusted_key()),
            Err(VerificationError::InvalidPayload(_))
        ));
    }

    #[test]
    fn tampered_text_payload_fails() {
        let token = TokenCodec::sign_text("uid=1000\n", &master_signing_key()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode("uid=0\n"), parts[2]);
        assert_eq!(
            TokenCodec::verify_payload(&forged, &master_trusted_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn header_is_exactly_rs512() {
        let token = TokenCodec::sign(&json!({}), &master_signing_key()).unwrap();
        let header = token.split('.').next().unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(header).unwrap(), br#"{"alg":"RS512"}"#);
    }

    #[test]
    fn mismatched_key_fails() {
        let token = TokenCodec::sign(&json!({"shell": "id"}), &master_signing_key()).unwrap();
        let other = TrustedKey::from_pem(OTHER_PUBLIC_PEM).unwrap();
        assert_eq!(
            TokenCodec::verify(&token, &other),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn token_from_untrusted_signer_fails() {
        let rogue = EncodingKey::from_rsa_pem(OTHER_PRIVATE_PEM.as_bytes()).unwrap();
        let token = TokenCodec::sign(&json!({"shell": "id"}), &rogue).unwrap();
        assert_eq!(
            TokenCodec::verify(&token, &master_trusted_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn tampered_payload_fails() {
        let token = TokenCodec::sign(&json!({"shell": "uptime"}), &master_signing_key()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            encode_segment(&json!({"shell": "reboot"})),
            parts[2]
        );
        assert_eq!(
            TokenCodec::verify(&forged, &master_trusted_key()),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        assert!(matches!(
            TokenCodec::verify("abc.def", &master_trusted_key()),
            Err(VerificationError::Malformed(_))
        ));
        assert!(matches!(
            TokenCodec::verify("a.b.c.d", &master_trusted_key()),
            Err(VerificationError::Malformed(_))
        ));
    }

    #[test]
    fn non_rsa_algorithms_are_refused() {
        let payload = encode_segment(&json!({"shell": "id"}));
        for alg in ["none", "HS256", "ES256"] {
            let token = format!("{}.{}.sig", encode_segment(&json!({"alg": alg})), payload);
            assert_eq!(
                TokenCodec::verify(&token, &master_trusted_key()),
                Err(VerificationError::UnsupportedAlgorithm(alg.to_string()))
            );
        }
    }

    #[test]
    fn accepts_other_rsa_digests_from_master() {
        let header = encode_segment(&json!({"alg": "RS256"}));
        let payload = encode_segment(&json!({"shell": "id"}));
        let input = format!("{header}.{payload}");
        let sig = crypto::sign(input.as_bytes(), &master_signing_key(), Algorithm::RS256).unwrap();
        let token = format!("{input}.{sig}");
        assert_eq!(
            TokenCodec::verify(&token, &master_trusted_key()).unwrap(),
            json!({"shell": "id"})
        );
    }

    #[test]
    fn invalid_trusted_key_is_reported() {
        assert!(matches!(
            TrustedKey::from_pem("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----"),
            Err(VerificationError::InvalidKey(_))
        ));
        assert!(TrustedKey::from_pem(MASTER_PUBLIC_PEM).is_ok());
    }
}
