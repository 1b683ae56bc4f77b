//! Periodic collection loop.

use crate::{
    collector::{
        Collector,
        CycleReport,
    },
    metrics::MetricPublisher,
    snapshot::SnapshotStore,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    instrument,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Collecting,
    Stopped,
}

/// Runs one collection immediately and then one per interval.
///
/// Cycles never overlap. A tick that comes due while a cycle is still running
/// is skipped rather than queued.
pub struct Scheduler {
    collector: Collector,
    store: Arc<SnapshotStore>,
    publisher: Arc<MetricPublisher>,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        collector: Collector,
        store: Arc<SnapshotStore>,
        publisher: Arc<MetricPublisher>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            collector,
            store,
            publisher,
            interval,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    #[instrument(name = "scheduler::run", skip_all, fields(interval = ?self.interval))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting scrape scheduler");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.run_once(&cancel).await {
                info!("Scrape interrupted by shutdown, keeping previous snapshot");
                break;
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("Scrape scheduler stopped");
    }

    /// Collects and publishes one cycle. Returns `false` if cancellation
    /// interrupted the cycle, in which case nothing is published.
    pub async fn run_once(&self, cancel: &CancellationToken) -> bool {
        self.state.send_replace(SchedulerState::Collecting);
        let report = self.collector.collect(cancel).await;
        if report.cancelled {
            return false;
        }

        self.publish(report);
        self.state.send_replace(SchedulerState::Idle);
        true
    }

    fn publish(&self, report: CycleReport) {
        info!(
            duration_ms = report.duration.as_millis(),
            wallets = report.snapshot.len(),
            entity_errors = report.entity_failures(),
            field_errors = report.field_errors.len(),
            "Scrape completed"
        );

        self.publisher.record_cycle(&report);
        let snapshot = self.store.replace(report.snapshot);
        self.publisher.publish(&snapshot);
    }
}
