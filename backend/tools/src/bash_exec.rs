/// Shell exec runtime: run a raw command through `sh -c` and capture output.
use anyhow::{anyhow, bail, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Exec config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Kill the command after this long.
    pub timeout: Duration,
    /// Maximum bytes kept from each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_output_bytes: 200_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Exec result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
}

impl ExecResult {
    /// Reply text: stdout, then stderr and status notes when present.
    pub fn render(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        if self.timed_out {
            out.push_str("\n[command timed out]");
        } else if self.exit_code != 0 {
            out.push_str(&format!("\n[exit status {}]", self.exit_code));
        }
        if self.truncated {
            out.push_str("\n[output truncated]");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Spawn + run
// ---------------------------------------------------------------------------

pub async fn exec_command(command: &str, config: &ExecConfig) -> Result<ExecResult> {
    if command.trim().is_empty() {
        bail!("Empty command");
    }
    let preview: String = command.chars().take(80).collect();
    info!("[BashExec] Running: {:?}", preview);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_handle = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not captured"))?;
    let mut stderr_handle = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not captured"))?;

    let max = config.max_output_bytes;
    let result = tokio::time::timeout(config.timeout, async move {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // Drain both pipes together so a chatty stderr cannot block stdout.
        let (out, err) = tokio::join!(
            stdout_handle.read_to_end(&mut stdout_buf),
            stderr_handle.read_to_end(&mut stderr_buf)
        );
        out?;
        err?;

        let status = child.wait().await?;
        let code = status.code().unwrap_or(-1);

        let truncated = stdout_buf.len() > max || stderr_buf.len() > max;
        stdout_buf.truncate(max);
        stderr_buf.truncate(max);

        Ok::<_, anyhow::Error>(ExecResult {
            stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
            exit_code: code,
            timed_out: false,
            truncated,
        })
    })
    .await;

    match result {
        Ok(r) => r,
        Err(_) => {
            warn!("[BashExec] Command timed out after {:?}", config.timeout);
            Ok(ExecResult {
                stdout: String::new(),
                stderr: format!("Command timed out after {}s", config.timeout.as_secs()),
                exit_code: -1,
                timed_out: true,
                truncated: false,
            })
        }
    }
}
