//! Log Redaction Layer
//!
//! Scrubs signed tokens, private key blocks and bearer credentials from
//! strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static PRIVATE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?-----END [A-Z ]*PRIVATE KEY-----")
        .unwrap()
});
static COMPACT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").unwrap()
});
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let mut redacted = PRIVATE_KEY_RE
        .replace_all(input, "[REDACTED_PRIVATE_KEY]")
        .to_string();

    redacted = COMPACT_TOKEN_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .to_string();

    redacted = BEARER_RE
        .replace_all(&redacted, "Bearer [REDACTED]")
        .to_string();

    redacted
}
