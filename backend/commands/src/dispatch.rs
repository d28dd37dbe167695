/// Command dispatch: run the operation a verified instruction selects and
/// render its result as reply text.
use std::sync::Arc;

use anyhow::Result;
use tether_core::{Claims, Instruction, ProcessInfo, SystemProbe};
use tracing::{info, warn};

use crate::types::{DispatchOutcome, Operation};

/// Stateless mapping from verified claims to an output.
pub struct CommandDispatcher {
    system: Arc<dyn SystemProbe>,
}

impl CommandDispatcher {
    pub fn new(system: Arc<dyn SystemProbe>) -> Self {
        Self { system }
    }

    /// Dispatch the instruction carried by `claims`.
    ///
    /// A failing operation still yields an output (`error: ...`) so the
    /// operator gets a correlated reply.
    pub async fn dispatch(&self, claims: &Claims) -> DispatchOutcome {
        let instruction = Instruction::from_claims(claims);
        let Some(selector) = instruction.shell else {
            return DispatchOutcome::NoMatchingOperation { selector: None };
        };
        let Some(operation) = Operation::detect(&selector) else {
            return DispatchOutcome::NoMatchingOperation {
                selector: Some(selector),
            };
        };

        info!(operation = %operation, "[Commands] Dispatching instruction");
        match self.run(&operation).await {
            Ok(text) => DispatchOutcome::Output(text),
            Err(e) => {
                warn!(operation = %operation, error = %e, "[Commands] Operation failed");
                DispatchOutcome::Output(format!("error: {e:#}"))
            }
        }
    }

    async fn run(&self, operation: &Operation) -> Result<String> {
        match operation {
            Operation::RawCommand(command) => self.system.run_command(command).await,
            Operation::ListProcesses => Ok(render_processes(&self.system.processes().await?)),
            Operation::ShellHistory => self.system.shell_history().await,
            Operation::ProxySettings => {
                Ok(serde_json::to_string(&self.system.proxy_settings().await?)?)
            }
            Operation::LocalHost => self.system.local_host().await,
            Operation::MachineDetails => {
                Ok(serde_json::to_string(&self.system.machine_details().await?)?)
            }
        }
    }
}

/// One `name: <name>, pid: <pid>, cpu_percent: <cpu>` line per process.
pub fn render_processes(processes: &[ProcessInfo]) -> String {
    processes
        .iter()
        .map(|p| {
            format!(
                "name: {}, pid: {}, cpu_percent: {:.1}\n",
                p.name, p.pid, p.cpu_percent
            )
        })
        .collect()
}
