//! `tether-config`: runtime configuration for the tether agent.
//!
//! Everything comes from environment variables; see [`vars`] for the names.

pub mod agent;
pub mod error;
pub mod vars;

pub use agent::{AgentConfig, LogConfig};
pub use error::ConfigError;
