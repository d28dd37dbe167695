//! Environment variable names and defaults.

pub const REMOTE_HOST: &str = "TETHER_REMOTE_HOST";
/// Older deployments set this instead of [`REMOTE_HOST`].
pub const REMOTE_HOST_LEGACY: &str = "XENA_ATILA_HOST";

pub const MASTER_PUBLIC_KEY: &str = "MASTER_PUBLIC_KEY";
pub const MASTER_PUBLIC_KEY_FILE: &str = "MASTER_PUBLIC_KEY_FILE";

pub const POLL_INTERVAL_SECS: &str = "TETHER_POLL_INTERVAL_SECS";
pub const REGISTER_BACKOFF_SECS: &str = "TETHER_REGISTER_BACKOFF_SECS";
pub const REQUEST_TIMEOUT_SECS: &str = "TETHER_REQUEST_TIMEOUT_SECS";
pub const SHELL_TIMEOUT_SECS: &str = "TETHER_SHELL_TIMEOUT_SECS";

pub const BODY_ENCODING: &str = "TETHER_BODY_ENCODING";
pub const NON_INSTRUCTION: &str = "TETHER_NON_INSTRUCTION";
pub const UNMATCHED: &str = "TETHER_UNMATCHED";

pub const HISTORY_FILE: &str = "TETHER_HISTORY_FILE";

pub const LOG_LEVEL: &str = "TETHER_LOG_LEVEL";
pub const LOG_DIR: &str = "TETHER_LOG_DIR";
pub const LOG_JSON: &str = "TETHER_LOG_JSON";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REGISTER_BACKOFF_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LOG_LEVEL: &str = "info";
