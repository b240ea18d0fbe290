mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use macp_sync::config::MacpConfig;

#[derive(Parser)]
#[command(name = "macp-sync", version, about = "Sync research papers between a GitHub repository and a local cache")]
struct Cli {
    /// Config file (default: ~/.macp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the manifest in the connected repository
    Init,
    /// Rebuild the local cache from the repository
    Hydrate,
    /// Show cache counts and remote manifest sizes
    Status {
        /// Skip the remote manifest lookup
        #[arg(long)]
        offline: bool,
    },
    /// Check a JSON document against the schema
    Validate {
        /// paper, analysis, consensus or agent
        kind: String,
        file: PathBuf,
    },
    /// Validate a paper, cache it, and push it to the repository
    SavePaper { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MacpConfig::load_from(path)?,
        None => MacpConfig::load()?,
    };

    // Logs go to stderr; stdout carries command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init => cli::init::init(&config).await?,
        Command::Hydrate => cli::hydrate::hydrate(&config).await?,
        Command::Status { offline } => cli::status::status(&config, offline).await?,
        Command::Validate { kind, file } => cli::validate::validate(&kind, &file)?,
        Command::SavePaper { file } => cli::save_paper::save_paper(&config, &file).await?,
    }

    Ok(())
}
