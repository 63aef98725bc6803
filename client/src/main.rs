//! remdesk CLI
//!
//! Opens one session against a peer and prints its state transitions.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use remdesk_client::{RuntimeConfig, RuntimeHandle, Services, SessionState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// remdesk - remote session client
#[derive(Parser, Debug)]
#[command(name = "remdesk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to a peer and follow the session
    Connect {
        /// Peer identifier (directory name or host:port)
        peer: String,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop the session after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Run in verbose mode
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the library version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Commands::Version => {
            println!("remdesk {}", RuntimeHandle::version());
            Ok(())
        }
        Commands::Connect {
            peer,
            config,
            duration,
            verbose,
        } => {
            remdesk_client::logging::init(verbose);
            connect(&peer, config, duration.map(Duration::from_secs)).await
        }
    }
}

async fn connect(peer: &str, config: Option<PathBuf>, duration: Option<Duration>) -> Result<()> {
    let config = match config {
        Some(path) => {
            let loaded = RuntimeConfig::load(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            loaded
        }
        None => RuntimeConfig::default(),
    };

    let services = Services::from_config(&config)?;
    let runtime = RuntimeHandle::init(config, services);

    let id = runtime.start_session(peer)?;
    let mut state = runtime.watch(id)?;
    println!("session {} -> {}", id, peer);

    let stop_after = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop_after);

    let mut stopping = false;
    let last = loop {
        let current = *state.borrow_and_update();
        println!("  {}", current);
        if current.is_terminal() {
            break current;
        }

        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break runtime.state(id)?;
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Interrupted, stopping session {}", id);
                stopping = true;
                runtime.stop_session(id)?;
            }
            _ = &mut stop_after, if !stopping => {
                info!("Duration elapsed, stopping session {}", id);
                stopping = true;
                runtime.stop_session(id)?;
            }
        }
    };

    let failure = runtime.get_error(id);
    runtime.cleanup().await;

    if last == SessionState::Failed {
        warn!("Session {} failed", id);
        bail!("{}", failure);
    }
    Ok(())
}
