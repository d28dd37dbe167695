//! Process-lifetime identity.
//!
//! Every start produces a new key pair and client id. Nothing is persisted:
//! the coordinating server learns the public key at registration and the
//! private key never leaves memory.

use std::fmt;

use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tether_core::{ClientRegistration, ClientStatus, TetherError};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Modulus size for generated keys.
pub const KEY_BITS: usize = 4096;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("RSA key generation failed: {0}")]
    Generation(String),

    #[error("PEM encoding failed: {0}")]
    Encoding(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

impl From<KeyError> for TetherError {
    fn from(e: KeyError) -> Self {
        TetherError::Key(e.to_string())
    }
}

/// A freshly generated RSA key pair in PEM form.
pub struct KeyPairPem {
    /// PKCS#1 (`RSA PRIVATE KEY`).
    pub private_pem: String,
    /// SubjectPublicKeyInfo (`PUBLIC KEY`).
    pub public_pem: String,
    pub modulus_bits: usize,
}

impl KeyPairPem {
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let mut rng = rand::thread_rng();
        let private =
            RsaPrivateKey::new(&mut rng, bits).map_err(|e| KeyError::Generation(e.to_string()))?;
        Self::from_private(&private)
    }

    fn from_private(private: &RsaPrivateKey) -> Result<Self, KeyError> {
        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encoding(e.to_string()))?
            .to_string();
        let public_pem = RsaPublicKey::from(private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(Self {
            private_pem,
            public_pem,
            modulus_bits: private.size() * 8,
        })
    }
}

impl fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("public_pem", &self.public_pem)
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}

/// The agent's identity: a client id and the key pair it signs with.
///
/// Read-only after construction; pass it by reference to whatever needs it.
pub struct Identity {
    client_id: String,
    signing_key: EncodingKey,
    public_key_pem: String,
    modulus_bits: usize,
}

impl Identity {
    /// Generate a new identity with a [`KEY_BITS`] key and a random client id.
    pub fn generate() -> Result<Self, KeyError> {
        let pair = KeyPairPem::generate(KEY_BITS)?;
        let client_id = Uuid::new_v4().to_string();
        debug!(client_id = %client_id, bits = pair.modulus_bits, "Generated agent identity");
        Self::from_pair(client_id, pair)
    }

    /// Build an identity from a fixed private key.
    #[cfg(any(test, feature = "testing"))]
    pub fn from_private_pem(client_id: &str, pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Self::from_pair(client_id.to_string(), KeyPairPem::from_private(&private)?)
    }

    fn from_pair(client_id: String, pair: KeyPairPem) -> Result<Self, KeyError> {
        let signing_key = EncodingKey::from_rsa_pem(pair.private_pem.as_bytes())
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            client_id,
            signing_key,
            public_key_pem: pair.public_pem,
            modulus_bits: pair.modulus_bits,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    pub fn signing_key(&self) -> &EncodingKey {
        &self.signing_key
    }

    /// The body sent to the server to announce this agent.
    pub fn registration(&self) -> ClientRegistration {
        ClientRegistration {
            id: self.client_id.clone(),
            public_key: self.public_key_pem.clone(),
            status: ClientStatus::Alive,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("client_id", &self.client_id)
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}
