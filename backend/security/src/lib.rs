pub mod keys;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use keys::{Identity, KeyError, KeyPairPem, KEY_BITS};
pub use token::{SigningError, TokenCodec, TrustedKey, SIGNING_ALGORITHM};

/// Key type used to sign outgoing tokens.
pub use jsonwebtoken::EncodingKey as SigningKey;
