use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::Args;
use tether_agent::AgentLoop;
use tether_config::{vars, AgentConfig};
use tether_security::Identity;
use tracing::info;

/// Flags that take precedence over the matching environment variables.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Base URL of the coordinating server
    #[arg(long)]
    remote_host: Option<String>,
    /// File holding the trusted master public key
    #[arg(long)]
    master_key_file: Option<String>,
    /// Seconds between poll cycles
    #[arg(long)]
    poll_interval: Option<u64>,
    /// Seconds between registration attempts
    #[arg(long)]
    register_backoff: Option<u64>,
    /// Request body encoding: json or form
    #[arg(long)]
    body_encoding: Option<String>,
    /// Verified non-instruction messages: skip or abort-batch
    #[arg(long)]
    non_instruction: Option<String>,
    /// Instructions naming no operation: ignore or reply-error
    #[arg(long)]
    unmatched: Option<String>,
    #[arg(long)]
    log_level: Option<String>,
    #[arg(long)]
    log_dir: Option<String>,
    /// Log as JSON lines on the console
    #[arg(long)]
    log_json: bool,
}

impl RunArgs {
    fn apply(self, env: &mut HashMap<String, String>) {
        let overrides = [
            (vars::REMOTE_HOST, self.remote_host),
            (vars::POLL_INTERVAL_SECS, self.poll_interval.map(|s| s.to_string())),
            (vars::REGISTER_BACKOFF_SECS, self.register_backoff.map(|s| s.to_string())),
            (vars::BODY_ENCODING, self.body_encoding),
            (vars::NON_INSTRUCTION, self.non_instruction),
            (vars::UNMATCHED, self.unmatched),
            (vars::LOG_LEVEL, self.log_level),
            (vars::LOG_DIR, self.log_dir),
            (vars::LOG_JSON, self.log_json.then(|| "true".to_string())),
        ];
        for (var, value) in overrides {
            if let Some(value) = value {
                env.insert(var.to_string(), value);
            }
        }
        if let Some(path) = self.master_key_file {
            env.remove(vars::MASTER_PUBLIC_KEY);
            env.insert(vars::MASTER_PUBLIC_KEY_FILE.to_string(), path);
        }
    }
}

pub fn load_config(args: RunArgs, mut env: HashMap<String, String>) -> Result<AgentConfig> {
    args.apply(&mut env);
    AgentConfig::from_vars(&env).context("invalid agent configuration")
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args, std::env::vars().collect())?;
    tether_logging::init_logger(&config.log.level, config.log.dir.as_deref(), config.log.json);

    info!(remote_host = %config.remote_host, "Generating agent identity");
    let identity = tokio::task::spawn_blocking(Identity::generate)
        .await
        .context("identity generation task failed")??;
    info!(client_id = %identity.client_id(), bits = identity.modulus_bits(), "Starting tether agent");

    let client_id = identity.client_id().to_string();
    let mut agent = AgentLoop::from_config(&config, identity)?;
    tokio::select! {
        _ = agent.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!(client_id = %client_id, "Shutting down");
        }
    }
    Ok(())
}
