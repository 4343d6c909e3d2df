//! LNXPhotos CLI - iCloud Photos downloader and sync engine for Linux
//!
//! Parses the layered multi-account command line, materializes one resolved
//! configuration per `--username`, and drives the account runs sequentially.
//! Exit codes: 0 clean (including cancellation after flush), 1 fatal error,
//! 2 configuration error.

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod credentials;
mod driver;
mod layers;
mod notify;
mod output;

use driver::{EXIT_CONFIG, EXIT_OK};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match layers::parse_layers(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    // Setup tracing; verbosity is the max across all segments
    let verbosity = invocation
        .accounts
        .iter()
        .map(|(_, args)| args.verbose)
        .chain(std::iter::once(invocation.defaults.verbose))
        .max()
        .unwrap_or(0);
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Materialize one config per account segment; any failure here is a
    // configuration error and nothing has run yet
    let mut configs = Vec::with_capacity(invocation.accounts.len());
    for (username, segment) in invocation.accounts {
        let merged = segment.merged_over(&invocation.defaults);
        match layers::materialize(username.clone(), merged) {
            Ok(config) => configs.push(config),
            Err(message) => {
                eprintln!("configuration error for {username}: {message}");
                std::process::exit(EXIT_CONFIG);
            }
        }
    }

    // Signals trip the cancel token; passes finish their current asset,
    // flush partials and session state, and exit cleanly
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current asset and shutting down");
            signal_cancel.cancel();
        }
    });

    let code = driver::run_accounts(configs, cancel).await;
    if code == EXIT_OK {
        info!("All account runs complete");
    }
    std::process::exit(code);
}
