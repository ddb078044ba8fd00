//! FaxSpool Bridge
//!
//! Usage:
//!     FTP_ROOT=/srv/ftp SEND_WEBHOOK_URL=https://fax.example.com/send \
//!     FAX_NUMBER=+15550000000 faxspool-bridge

use anyhow::Result;
use clap::Parser;
use faxspool_bridge::{Bridge, BridgeArgs, BridgeConfig};
use faxspool_logging::{init_logging, LogConfig};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let log_dir = init_logging(LogConfig {
        app_name: "faxspool-bridge",
        verbose: args.verbose,
        log_dir: args.log_dir.clone(),
    })?;
    info!("Logging to {}", log_dir.display());

    let config = BridgeConfig::try_from(args)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_signal_handler(shutdown_tx)?;

    let bridge = Bridge::new(config)?;
    bridge.run(shutdown_rx).await
}

#[cfg(unix)]
fn install_signal_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, shutting down...", sig);
            let _ = shutdown_tx.send(true);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });
    Ok(())
}
