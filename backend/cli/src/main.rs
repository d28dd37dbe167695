mod keys_cmd;
mod run_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use run_cmd::RunArgs;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Remote-controlled agent answering signed instructions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the remote host and process instructions until stopped
    Run(RunArgs),
    /// Generate an operator key pair (master.pem, master.pub.pem)
    Keygen {
        /// Directory to write the key pair into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Replace existing key files
        #[arg(long)]
        force: bool,
    },
    /// Sign instruction claims with an operator private key
    Sign {
        /// PEM private key file
        #[arg(short, long)]
        key: PathBuf,
        /// Claims as JSON, e.g. '{"shell":"/get processes"}'
        #[arg(short, long)]
        claims: String,
    },
    /// Verify a token against a public key and print its payload
    Verify {
        /// PEM public key file
        #[arg(short, long)]
        key: PathBuf,
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_cmd::run(args).await?,
        Commands::Keygen { out, force } => {
            tether_logging::init_logger("warn", None, false);
            let written = keys_cmd::keygen(&out, force).await?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Sign { key, claims } => {
            println!("{}", keys_cmd::sign(&key, &claims)?);
        }
        Commands::Verify { key, token } => {
            let rendered = keys_cmd::verify(&key, &token)?;
            if rendered.ends_with('\n') {
                print!("{rendered}");
            } else {
                println!("{rendered}");
            }
        }
    }

    Ok(())
}
