use gravsim::{ServerConfig, Orchestrator, SimulationHandle};
use gravsim::{bench_gravity, bench_hierarchical, bench_tiled};
use gravsim::server::ws;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation service (default)
    Serve {
        /// YAML config file, defaults apply when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Override `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print solver timing tables
    Bench {
        #[arg(long, default_value_t = 256)]
        tile_size: usize,
    },
}

fn init_logging(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(file: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let mut config = ServerConfig::load(file.as_deref()).context("failed to load config")?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let orchestrator = Orchestrator::new(config.orchestrator_settings(), config.tiled.provider());
    let handle = SimulationHandle::spawn(orchestrator, config.broadcast_settings());

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
    };
    ws::serve(listener, handle.clone(), shutdown).await?;

    // device teardown failures are the only fatal shutdown error
    handle.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    match args.command {
        Some(Command::Serve { file, bind }) => serve(file, bind).await?,
        None => serve(None, None).await?,
        Some(Command::Bench { tile_size }) => {
            bench_gravity();
            bench_hierarchical();
            bench_tiled(tile_size).await?;
        }
    }

    Ok(())
}
