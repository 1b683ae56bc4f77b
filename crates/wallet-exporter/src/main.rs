use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use wallet_exporter::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Args::parse()
        .into_config(std::env::vars())
        .context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = ?e, "Error setting up signal handler");
        } else {
            info!("Shutdown signal received, initiating graceful shutdown...");
            signal_token.cancel();
        }
    });

    wallet_exporter::run(config, shutdown).await
}

/// Wait for SIGTERM or SIGINT (Ctrl+C)
async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
