//! Flying Carpet CLI
//!
//! Encrypted file transfer between two computers over an ad-hoc wireless
//! link the tool brings up itself.

mod args;
mod sink;

use args::{Cli, USAGE};
use carpet_core::{Timeouts, TransferConfig, TransferEngine};
use carpet_wifi::NativeWifi;
use clap::Parser;
use sink::ConsoleSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Exit code when a signal interrupted the transfer.
const EXIT_INTERRUPTED: i32 = 45;

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    // Internal diagnostics only; transfer narration goes to the sink.
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "warn" })
        .init();

    let mode = match args::build_mode(&cli) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{USAGE}");
            return 1;
        }
    };
    tracing::debug!(port = cli.port, "transfer configured");

    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));

    // Ctrl-C sets the cancel token; the engine unwinds through its
    // teardown and we exit 45 afterwards.
    tokio::spawn({
        let cancel = cancel.clone();
        let interrupted = interrupted.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                eprintln!("\nReceived interrupt signal, resetting WiFi and exiting.");
                cancel.cancel();
            }
        }
    });

    let wifi = match NativeWifi::new().await {
        Ok(wifi) => wifi,
        Err(e) => {
            eprintln!("Could not initialise wireless control: {e}");
            return 1;
        }
    };

    let engine = TransferEngine::new(wifi);
    let result = engine
        .run(TransferConfig {
            mode,
            peer_os: cli.peer,
            port: cli.port,
            timeouts: Timeouts::default(),
            progress: Arc::new(ConsoleSink::new()),
            cancel,
        })
        .await;

    if interrupted.load(Ordering::SeqCst) {
        return EXIT_INTERRUPTED;
    }
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}
