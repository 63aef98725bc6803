//! Log output for the CLI and embedding hosts

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// when `verbose`. Returns false if a subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
