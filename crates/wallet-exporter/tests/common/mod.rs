#![allow(dead_code)]

use alloy::primitives::Address;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wallet_exporter::{
    collector::Collector,
    config::CustomWallet,
    metrics::MetricPublisher,
    scheduler::Scheduler,
    snapshot::SnapshotStore,
    test_utils::{
        FakeProber,
        FakeSource,
    },
};

pub const PREFIX: &str = "dealbot";

pub fn metric(name: &str) -> String {
    format!("{PREFIX}_{name}")
}

/// Scheduler wired to in-memory fakes, driven one cycle at a time.
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub prober: Arc<FakeProber>,
    pub store: Arc<SnapshotStore>,
    pub publisher: Arc<MetricPublisher>,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(custom_wallets: Vec<CustomWallet>, max_concurrent: usize) -> Self {
        let source = Arc::new(FakeSource::default());
        let prober = Arc::new(source.prober());
        let store = Arc::new(SnapshotStore::new());
        let publisher = Arc::new(MetricPublisher::new(PREFIX).unwrap());
        let collector = Collector::new(
            source.clone(),
            prober.clone(),
            Address::repeat_byte(0xee),
            custom_wallets,
            max_concurrent,
        );
        let scheduler = Scheduler::new(
            collector,
            store.clone(),
            publisher.clone(),
            std::time::Duration::from_secs(60),
        );

        Self {
            source,
            prober,
            store,
            publisher,
            scheduler,
        }
    }

    pub async fn cycle(&self) {
        assert!(self.scheduler.run_once(&CancellationToken::new()).await);
    }
}
