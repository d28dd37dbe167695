use thiserror::Error;

/// Top-level error type for the tether agent.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("key material error: {0}")]
    Key(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A failed exchange with the coordinating server. Always recoverable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote returned status {0}")]
    Status(u16),

    #[error("network failure: {0}")]
    Network(String),

    #[error("unreadable response body: {0}")]
    Body(String),
}

/// A message whose content cannot be trusted. The message is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature does not match the trusted key")]
    SignatureMismatch,

    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("invalid verification key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_pass_through_unchanged() {
        let err: TetherError = TransportError::Status(503).into();
        assert!(matches!(err, TetherError::Transport(TransportError::Status(503))));
        assert_eq!(err.to_string(), "remote returned status 503");
    }

    #[test]
    fn umbrella_wraps_typed_errors() {
        let err: TetherError = VerificationError::SignatureMismatch.into();
        assert!(matches!(err, TetherError::Verification(_)));
        assert_eq!(err.to_string(), "signature does not match the trusted key");
    }
}
