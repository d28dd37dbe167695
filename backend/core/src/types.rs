use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How request bodies are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Json,
    /// `application/x-www-form-urlencoded`; null fields are omitted.
    #[default]
    Form,
}

/// What to do with a verified message whose subject is not `instruction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonInstructionPolicy {
    /// Drop that message, keep processing the batch.
    #[default]
    Skip,
    /// Stop processing the rest of the current batch.
    AbortBatch,
}

/// What to do when an instruction names no known operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedPolicy {
    /// No reply and no acknowledgment.
    #[default]
    Ignore,
    /// Reply with an error text, then acknowledge.
    ReplyError,
}

fn parse_choice<T: Copy>(s: &str, choices: &[(&str, T)], what: &str) -> Result<T, String> {
    let wanted = s.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            let names: Vec<&str> = choices.iter().map(|(n, _)| *n).collect();
            format!("invalid {what} '{s}'; expected one of: {}", names.join(", "))
        })
}

impl FromStr for BodyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            s,
            &[("json", BodyEncoding::Json), ("form", BodyEncoding::Form)],
            "body encoding",
        )
    }
}

impl FromStr for NonInstructionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            s,
            &[
                ("skip", NonInstructionPolicy::Skip),
                ("abort-batch", NonInstructionPolicy::AbortBatch),
            ],
            "non-instruction policy",
        )
    }
}

impl FromStr for UnmatchedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            s,
            &[
                ("ignore", UnmatchedPolicy::Ignore),
                ("reply-error", UnmatchedPolicy::ReplyError),
            ],
            "unmatched policy",
        )
    }
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyEncoding::Json => write!(f, "json"),
            BodyEncoding::Form => write!(f, "form"),
        }
    }
}
