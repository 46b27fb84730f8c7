//! Skirmish dedicated server.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p skirmish_server -- --config crates/skirmish_server/config/server.ron
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use skirmish_server::{network, GameLoop, ServerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long finished connections get to flush before the endpoint closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "skirmish_server")]
#[command(about = "Authoritative RTS match server")]
#[command(version)]
struct Cli {
    /// Server config (RON). Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> skirmish_server::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    let catalog = config.load_catalog()?;
    let sim = config.match_config.build_simulation(&catalog)?;

    let endpoint = network::bind(&config)?;
    let (handle, game) = GameLoop::new(sim, &config).spawn();
    let server = tokio::spawn(network::serve(endpoint.clone(), handle));

    let winner = game.await?;
    match winner {
        Some(team) => info!("Match complete, team {team} wins"),
        None => info!("Match ended without a winner"),
    }

    server.abort();
    if tokio::time::timeout(SHUTDOWN_GRACE, endpoint.wait_idle())
        .await
        .is_err()
    {
        warn!("Connections still open after {SHUTDOWN_GRACE:?}, closing");
        endpoint.close(0u32.into(), b"server shutdown");
    }
    Ok(())
}
