use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use patchsmith::telemetry::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "patchsmith")]
#[command(version, about = "Turn change requests into pull requests")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Path to config.toml (defaults to .patchsmith/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and worker pool
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one job in the foreground
    Run {
        /// Repository URL, e.g. https://github.com/owner/repo
        #[arg(long)]
        repo: String,

        /// What to change, in plain language
        #[arg(long)]
        instruction: String,
    },
    /// Show the resolved configuration and any warnings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_format)?;

    let config = cmd::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Serve { port } => cmd::cmd_serve(config, *port).await?,
        Commands::Run { repo, instruction } => cmd::cmd_run(config, repo, instruction).await?,
        Commands::Config => cmd::cmd_config(&config, cli.config.as_deref())?,
    }

    Ok(())
}
