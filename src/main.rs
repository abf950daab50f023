use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use swarm_coordinator::config::Config;
use swarm_coordinator::errors::StartupError;
use swarm_coordinator::server;

#[derive(Parser)]
#[command(name = "swarm-coordinator")]
#[command(version, about = "HTTP coordination service for parallel swarm workers")]
pub struct Cli {
    /// Path to coordination.toml. Defaults to no file, i.e. built-in defaults plus env overrides.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coordination server until interrupted.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Print the fully-resolved configuration (file, then env, then CLI overrides) as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config).map_err(StartupError::Config)?;

    match cli.command {
        Commands::Serve { host, port, db_path } => {
            if let Some(host) = host {
                config.toml.server.host = host;
            }
            if let Some(port) = port {
                config.toml.server.port = port;
            }
            if let Some(db_path) = db_path {
                config.toml.server.database_path = db_path.to_string_lossy().into_owned();
            }

            swarm_coordinator::logging::init(config.toml.logging.format, &config.toml.logging.level)
                .context("failed to initialize logging")?;

            for warning in config.toml.validate() {
                tracing::warn!("{warning}");
            }

            server::start_server(&config).await?;
            Ok(())
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config.toml).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}
