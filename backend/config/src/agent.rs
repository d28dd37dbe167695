//! The agent's runtime configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tether_core::{BodyEncoding, NonInstructionPolicy, UnmatchedPolicy};
use tracing::debug;

use crate::error::ConfigError;
use crate::vars;

/// Logging knobs handed to the subscriber at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: vars::DEFAULT_LOG_LEVEL.to_string(),
            dir: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the coordinating server, without a trailing `/`.
    pub remote_host: String,
    /// PEM of the key every instruction must be signed with.
    pub master_public_key_pem: String,
    pub poll_interval: Duration,
    pub register_backoff: Duration,
    pub request_timeout: Duration,
    pub shell_timeout: Duration,
    pub body_encoding: BodyEncoding,
    pub non_instruction: NonInstructionPolicy,
    pub unmatched: UnmatchedPolicy,
    pub history_file: Option<PathBuf>,
    pub log: LogConfig,
}

impl AgentConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Read the configuration from an explicit variable map.
    pub fn from_vars(env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let remote_host = match (get(vars::REMOTE_HOST), get(vars::REMOTE_HOST_LEGACY)) {
            (Some(host), _) => parse_remote_host(vars::REMOTE_HOST, host)?,
            (None, Some(host)) => {
                debug!("Using legacy {} for the remote host", vars::REMOTE_HOST_LEGACY);
                parse_remote_host(vars::REMOTE_HOST_LEGACY, host)?
            }
            (None, None) => return Err(ConfigError::Missing(vars::REMOTE_HOST)),
        };

        let master_public_key_pem = match (
            env.get(vars::MASTER_PUBLIC_KEY).filter(|v| !v.trim().is_empty()),
            get(vars::MASTER_PUBLIC_KEY_FILE),
        ) {
            (Some(inline), _) => unescape_newlines(inline),
            (None, Some(path)) => {
                std::fs::read_to_string(path).map_err(|source| ConfigError::KeyFile {
                    var: vars::MASTER_PUBLIC_KEY_FILE,
                    path: PathBuf::from(path),
                    source,
                })?
            }
            (None, None) => return Err(ConfigError::Missing(vars::MASTER_PUBLIC_KEY)),
        };
        if !master_public_key_pem.contains("-----BEGIN") {
            return Err(ConfigError::invalid(
                vars::MASTER_PUBLIC_KEY,
                "expected a PEM-encoded public key",
            ));
        }

        let poll_interval = secs(
            get(vars::POLL_INTERVAL_SECS),
            vars::POLL_INTERVAL_SECS,
            vars::DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let register_backoff = secs(
            get(vars::REGISTER_BACKOFF_SECS),
            vars::REGISTER_BACKOFF_SECS,
            vars::DEFAULT_REGISTER_BACKOFF_SECS,
        )?;
        let request_timeout = secs(
            get(vars::REQUEST_TIMEOUT_SECS),
            vars::REQUEST_TIMEOUT_SECS,
            vars::DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let shell_timeout = secs(
            get(vars::SHELL_TIMEOUT_SECS),
            vars::SHELL_TIMEOUT_SECS,
            vars::DEFAULT_SHELL_TIMEOUT_SECS,
        )?;

        let log = LogConfig {
            level: get(vars::LOG_LEVEL)
                .unwrap_or(vars::DEFAULT_LOG_LEVEL)
                .to_string(),
            dir: get(vars::LOG_DIR).map(PathBuf::from),
            json: get(vars::LOG_JSON)
                .map(|v| parse_bool(vars::LOG_JSON, v))
                .transpose()?
                .unwrap_or(false),
        };

        Ok(Self {
            remote_host,
            master_public_key_pem,
            poll_interval,
            register_backoff,
            request_timeout,
            shell_timeout,
            body_encoding: choice(get(vars::BODY_ENCODING), vars::BODY_ENCODING)?,
            non_instruction: choice(get(vars::NON_INSTRUCTION), vars::NON_INSTRUCTION)?,
            unmatched: choice(get(vars::UNMATCHED), vars::UNMATCHED)?,
            history_file: get(vars::HISTORY_FILE).map(PathBuf::from),
            log,
        })
    }
}

fn parse_remote_host(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let rest = raw
        .strip_prefix("http://")
        .or_else(|| raw.strip_prefix("https://"))
        .ok_or_else(|| ConfigError::invalid(var, format!("'{raw}' is not an http(s) URL")))?;
    if rest.trim_matches('/').is_empty() {
        return Err(ConfigError::invalid(var, format!("'{raw}' has no host")));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn secs(raw: Option<&str>, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(default));
    };
    let value: u64 = raw
        .parse()
        .map_err(|_| ConfigError::invalid(var, format!("'{raw}' is not a number of seconds")))?;
    if value == 0 {
        return Err(ConfigError::invalid(var, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn choice<T>(raw: Option<&str>, var: &'static str) -> Result<T, ConfigError>
where
    T: FromStr<Err = String> + Default,
{
    raw.map(|v| v.parse().map_err(|e: String| ConfigError::invalid(var, e)))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, format!("'{raw}' is not a boolean"))),
    }
}

/// Single-line env values may carry the PEM with literal `\n` separators.
fn unescape_newlines(pem: &str) -> String {
    if pem.contains('\n') {
        pem.to_string()
    } else {
        pem.replace("\\n", "\n")
    }
}
