use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One running process as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub cpu_percent: f32,
}

/// The local operations an instruction can invoke.
///
/// Implementations do the actual work on the host; the dispatcher only
/// decides which one to call and how to render the result.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Run `command` through the shell and capture its output.
    async fn run_command(&self, command: &str) -> Result<String>;

    /// Snapshot of running processes.
    async fn processes(&self) -> Result<Vec<ProcessInfo>>;

    /// Contents of the shell history file.
    async fn shell_history(&self) -> Result<String>;

    /// Proxy configuration, keyed by scheme.
    async fn proxy_settings(&self) -> Result<BTreeMap<String, String>>;

    /// Host name and network interface enumeration.
    async fn local_host(&self) -> Result<String>;

    /// Environment and machine metadata.
    async fn machine_details(&self) -> Result<serde_json::Value>;
}
