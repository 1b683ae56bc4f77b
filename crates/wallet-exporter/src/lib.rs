#![doc = include_str!("../README.md")]
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::unreachable)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![warn(clippy::indexing_slicing)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]

pub mod cli;
pub mod collector;
pub mod config;
pub mod enricher;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod probe;
pub mod scheduler;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod status;
#[cfg(any(test, feature = "test"))]
pub mod test_utils;

pub use config::Config;
pub use error::ExporterError;

use crate::{
    collector::Collector,
    metrics::MetricPublisher,
    probe::PROBE_TIMEOUT,
    scheduler::Scheduler,
    server::{
        AppState,
        HttpServer,
    },
    snapshot::SnapshotStore,
    source::{
        HttpProber,
        RpcSource,
    },
};
use anyhow::{
    Context,
    Result,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};

/// Upper bound on how long the HTTP server may take to drain after shutdown.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the exporter until `shutdown` is cancelled.
///
/// Connecting to the RPC endpoint and resolving the dependent contract
/// addresses happen before anything is served; failures there are returned
/// immediately.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        custom_wallets = config.custom_wallets.len(),
        max_concurrent_requests = config.max_concurrent_requests,
        "Starting wallet exporter"
    );

    let source = RpcSource::connect(
        config.rpc_url.clone(),
        config.warm_storage_address,
        config.usdfc_token_address,
        config.payments_address,
    )
    .await
    .context("failed to initialize RPC data source")?;
    let prober = HttpProber::new(PROBE_TIMEOUT).context("failed to build probe client")?;

    let store = Arc::new(SnapshotStore::new());
    let publisher = Arc::new(
        MetricPublisher::new(&config.metrics_prefix).context("failed to register metrics")?,
    );

    let collector = Collector::new(
        Arc::new(source),
        Arc::new(prober),
        config.usdfc_token_address,
        config.custom_wallets.clone(),
        config.max_concurrent_requests,
    );
    let scheduler = Scheduler::new(
        collector,
        store.clone(),
        publisher.clone(),
        config.scrape_interval,
    );

    let server = HttpServer::new(
        config.listen_addr(),
        AppState {
            store,
            publisher,
            network: config.network.to_string().into(),
        },
        shutdown.clone(),
    );

    let mut server_task = tokio::spawn(server.run());
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::select! {
        () = shutdown.cancelled() => {}
        result = &mut server_task => {
            // the server only returns early on a bind or serve failure
            shutdown.cancel();
            join_scheduler_logged(scheduler_task).await;
            return result
                .context("HTTP server task panicked")?
                .context("HTTP server failed");
        }
    }

    scheduler_task
        .await
        .context("scrape scheduler task panicked")?;

    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server_task).await {
        Ok(joined) => joined
            .context("HTTP server task panicked")?
            .context("HTTP server failed")?,
        Err(_) => warn!("HTTP server did not stop in time"),
    }

    info!("Exporter stopped");
    Ok(())
}

/// Waits for the scheduler task on a path that is already failing. A panic is
/// logged instead of replacing the original error. Returns whether the task
/// exited cleanly.
async fn join_scheduler_logged(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = ?e, "Scrape scheduler task panicked");
            false
        }
    }
}
