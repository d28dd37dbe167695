use std::path::PathBuf;

use thiserror::Error;

/// A configuration problem, naming the variable at fault.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot read {var} at {path}: {source}")]
    KeyFile {
        var: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }

    /// The environment variable this error is about.
    pub fn var(&self) -> &'static str {
        match self {
            Self::Missing(var) => var,
            Self::Invalid { var, .. } | Self::KeyFile { var, .. } => var,
        }
    }
}

impl From<ConfigError> for tether_core::TetherError {
    fn from(e: ConfigError) -> Self {
        tether_core::TetherError::Config(e.to_string())
    }
}
