//! [`SystemProbe`] backed by the local host.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sysinfo::{Networks, System};
use tether_core::{ProcessInfo, SystemProbe};
use tracing::debug;

use crate::bash_exec::{exec_command, ExecConfig};
use crate::{history, proxy};

/// Runs operations against the machine the agent lives on.
#[derive(Debug, Clone, Default)]
pub struct LocalSystem {
    exec: ExecConfig,
    history_override: Option<PathBuf>,
}

impl LocalSystem {
    pub fn new(exec: ExecConfig, history_override: Option<PathBuf>) -> Self {
        Self {
            exec,
            history_override,
        }
    }
}

#[async_trait]
impl SystemProbe for LocalSystem {
    async fn run_command(&self, command: &str) -> Result<String> {
        Ok(exec_command(command, &self.exec).await?.render())
    }

    async fn processes(&self) -> Result<Vec<ProcessInfo>> {
        let list = tokio::task::spawn_blocking(|| {
            // CPU usage is a delta; it needs two samples at least this far apart.
            let mut sys = System::new_all();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_all();

            let mut list: Vec<ProcessInfo> = sys
                .processes()
                .values()
                .map(|p| ProcessInfo {
                    name: p.name().to_string_lossy().into_owned(),
                    pid: p.pid().as_u32(),
                    cpu_percent: p.cpu_usage(),
                })
                .collect();
            list.sort_by_key(|p| p.pid);
            list
        })
        .await?;
        debug!(count = list.len(), "[LocalSystem] Sampled processes");
        Ok(list)
    }

    async fn shell_history(&self) -> Result<String> {
        let path = history::history_path(
            self.history_override.as_deref(),
            std::env::var("HISTFILE").ok(),
            dirs::home_dir(),
        )
        .ok_or_else(|| anyhow!("no shell history location (HOME is unset)"))?;
        history::read_history(&path).await
    }

    async fn proxy_settings(&self) -> Result<BTreeMap<String, String>> {
        Ok(proxy::proxy_settings())
    }

    async fn local_host(&self) -> Result<String> {
        tokio::task::spawn_blocking(|| {
            let host = System::host_name().unwrap_or_else(|| "unknown".to_string());
            let networks = Networks::new_with_refreshed_list();

            let mut interfaces: Vec<_> = networks.list().iter().collect();
            interfaces.sort_by(|a, b| a.0.cmp(b.0));

            let mut out = format!("hostname: {host}\n");
            for (name, data) in interfaces {
                let addresses: Vec<String> = data
                    .ip_networks()
                    .iter()
                    .map(|n| format!("{}/{}", n.addr, n.prefix))
                    .collect();
                let _ = writeln!(
                    out,
                    "interface: {name}, mac: {}, addresses: [{}]",
                    data.mac_address(),
                    addresses.join(", ")
                );
            }
            out
        })
        .await
        .map_err(Into::into)
    }

    async fn machine_details(&self) -> Result<Value> {
        let details = tokio::task::spawn_blocking(|| {
            let sys = System::new_all();
            json!({
                "os": System::name(),
                "os_version": System::os_version(),
                "long_os_version": System::long_os_version(),
                "kernel_version": System::kernel_version(),
                "hostname": System::host_name(),
                "arch": std::env::consts::ARCH,
                "family": std::env::consts::FAMILY,
                "cpu_count": sys.cpus().len(),
                "total_memory_bytes": sys.total_memory(),
                "used_memory_bytes": sys.used_memory(),
                "uptime_secs": System::uptime(),
                "user": std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok(),
                "home": dirs::home_dir().map(|p| p.display().to_string()),
                "pid": std::process::id(),
            })
        })
        .await?;
        Ok(details)
    }
}
