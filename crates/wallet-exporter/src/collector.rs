//! One collection cycle: enumerate, enrich, probe, assemble.

use crate::{
    config::CustomWallet,
    enricher::{
        Enriched,
        EntityTarget,
        Enricher,
    },
    error::{
        EntityId,
        FetchError,
        FieldError,
        RemoteCall,
    },
    pool::WorkerPool,
    probe::ProbePipeline,
    snapshot::Snapshot,
    source::{
        DataSource,
        Prober,
    },
};
use alloy::primitives::Address;
use chrono::Utc;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    instrument,
    warn,
};

/// Everything one cycle produced.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub snapshot: Snapshot,
    /// Entities dropped because a foundational lookup failed.
    pub entity_errors: Vec<FetchError>,
    /// Fields that fell back to their default value.
    pub field_errors: Vec<FieldError>,
    pub panicked: usize,
    /// Set when cancellation interrupted the cycle. The snapshot is then
    /// incomplete and must not be published.
    pub cancelled: bool,
    pub duration: Duration,
}

impl CycleReport {
    fn interrupted(started_at: Instant) -> Self {
        Self {
            cancelled: true,
            duration: started_at.elapsed(),
            ..Self::default()
        }
    }

    pub fn entity_failures(&self) -> usize {
        self.entity_errors.len() + self.panicked
    }
}

#[derive(Clone)]
pub struct Collector {
    source: Arc<dyn DataSource>,
    enricher: Enricher,
    probes: ProbePipeline,
    custom_wallets: Arc<[CustomWallet]>,
    max_concurrent: usize,
}

impl Collector {
    pub fn new(
        source: Arc<dyn DataSource>,
        prober: Arc<dyn Prober>,
        payment_token: Address,
        custom_wallets: Vec<CustomWallet>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            enricher: Enricher::new(source.clone(), payment_token),
            probes: ProbePipeline::new(source.clone(), prober),
            source,
            custom_wallets: custom_wallets.into(),
            max_concurrent,
        }
    }

    /// Runs one cycle. Never fails as a whole; sub-failures are reported in
    /// the returned [`CycleReport`].
    #[instrument(name = "collector::collect", skip_all)]
    pub async fn collect(&self, cancel: &CancellationToken) -> CycleReport {
        let started_at = Instant::now();
        let mut report = CycleReport::default();

        let enumerated = tokio::select! {
            biased;
            () = cancel.cancelled() => return CycleReport::interrupted(started_at),
            enumerated = self.enumerate(&mut report) => enumerated,
        };
        let (provider_count, approved) = enumerated;

        let pool = WorkerPool::new(self.max_concurrent, cancel.clone());
        let provider_ids = 1..=provider_count;

        let (providers, wallets, mut pings) = tokio::join!(
            pool.run(provider_ids.clone(), |id| {
                let enricher = self.enricher.clone();
                let approved = approved.contains(&id);
                async move { enricher.enrich(EntityTarget::Provider { id, approved }).await }
            }),
            pool.run(self.custom_wallets.iter().cloned().enumerate(), |(index, wallet)| {
                let enricher = self.enricher.clone();
                async move {
                    let enriched = enricher.enrich(EntityTarget::Wallet(wallet)).await?;
                    Ok::<_, FetchError>((index, enriched))
                }
            }),
            self.probes.run(&pool, provider_ids),
        );

        let mut provider_records = providers.completed;
        provider_records.sort_unstable_by_key(|enriched| enriched.record.provider_id());
        let mut wallet_records = wallets.completed;
        wallet_records.sort_unstable_by_key(|(index, _)| *index);

        let mut records = Vec::with_capacity(provider_records.len() + wallet_records.len());
        let enriched = provider_records
            .into_iter()
            .chain(wallet_records.into_iter().map(|(_, enriched)| enriched));
        for Enriched { record, degraded } in enriched {
            let ping = record.provider_id().and_then(|id| pings.remove(&id));
            records.push(record.with_ping(ping));
            report.field_errors.extend(degraded);
        }

        for error in providers.failed.into_iter().chain(wallets.failed) {
            warn!(entity = %error.entity, error = %error.source, "Dropping entity from snapshot");
            report.entity_errors.push(error);
        }

        report.panicked = providers.panicked + wallets.panicked;
        report.cancelled =
            cancel.is_cancelled() || providers.cancelled > 0 || wallets.cancelled > 0;
        report.snapshot = Snapshot::new(records, Utc::now());
        report.duration = started_at.elapsed();
        report
    }

    /// Provider count and approved set. A failed count skips every provider
    /// for this cycle; a failed approved set treats every provider as not
    /// approved.
    async fn enumerate(&self, report: &mut CycleReport) -> (u64, HashSet<u64>) {
        let provider_count = match self.source.provider_count().await {
            Ok(count) => count,
            Err(source) => {
                warn!(error = %source, "Failed to enumerate providers");
                report.entity_errors.push(FetchError {
                    entity: EntityId::Registry,
                    source,
                });
                return (0, HashSet::new());
            }
        };

        let approved = match self.source.approved_provider_ids().await {
            Ok(approved) => approved,
            Err(source) => {
                warn!(error = %source, "Failed to fetch approved providers, treating none as approved");
                report.field_errors.push(FieldError {
                    entity: EntityId::Registry,
                    field: RemoteCall::ApprovedProviders.as_str(),
                    source,
                });
                HashSet::new()
            }
        };

        debug!(
            provider_count,
            approved = approved.len(),
            "Enumerated providers"
        );
        (provider_count, approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{
            EntityKind,
            WalletKind,
        },
        test_utils::{
            Failure,
            FakeProber,
            FakeSource,
            pdp_product,
            provider_info,
            tokens,
        },
    };
    use pretty_assertions::assert_eq;

    fn sp(id: u8) -> Address {
        Address::repeat_byte(id)
    }

    fn wallet(byte: u8, name: &str) -> CustomWallet {
        CustomWallet {
            address: Address::repeat_byte(byte),
            name: name.to_string(),
            kind: WalletKind::Client,
        }
    }

    fn registry(providers: u8) -> Arc<FakeSource> {
        let source = Arc::new(FakeSource::default());
        for id in 1..=providers {
            source.add_provider(u64::from(id), provider_info(sp(id), &format!("sp{id}")));
            source.set_native_balance(sp(id), tokens(u64::from(id)));
        }
        source
    }

    fn collector(source: Arc<FakeSource>, wallets: Vec<CustomWallet>, max: usize) -> Collector {
        Collector::new(
            source,
            Arc::new(FakeProber::default()),
            Address::repeat_byte(0xee),
            wallets,
            max,
        )
    }

    #[tokio::test]
    async fn records_are_ordered_providers_then_wallets() {
        let source = registry(5);
        let report = collector(
            source,
            vec![wallet(0xa1, "first"), wallet(0xa2, "second")],
            3,
        )
        .collect(&CancellationToken::new())
        .await;

        let names: Vec<_> = report
            .snapshot
            .records()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["sp1", "sp2", "sp3", "sp4", "sp5", "first", "second"]);
        assert!(!report.cancelled);
        assert!(report.snapshot.captured_at().is_some());
    }

    #[tokio::test]
    async fn approved_set_flows_into_provider_facts() {
        let source = registry(3);
        source.approve(2);

        let report = collector(source, vec![], 2)
            .collect(&CancellationToken::new())
            .await;

        let approved: Vec<_> = report
            .snapshot
            .of_kind(EntityKind::Provider)
            .map(|r| r.provider.map(|p| p.is_approved))
            .collect();
        assert_eq!(approved, vec![Some(false), Some(true), Some(false)]);
    }

    #[tokio::test]
    async fn pings_are_joined_by_provider_id() {
        let source = registry(2);
        source.set_product(2, pdp_product("https://two.example"));
        let prober = Arc::new(FakeProber::default());
        prober.respond("https://two.example/pdp/ping", Duration::from_millis(7));

        let report = Collector::new(source, prober, Address::ZERO, vec![], 4)
            .collect(&CancellationToken::new())
            .await;

        let records = report.snapshot.records();
        assert_eq!(records[0].ping, None);
        let ping = records[1].ping.as_ref().unwrap();
        assert!(ping.success);
        assert_eq!(ping.duration_ms, 7);
    }

    #[tokio::test]
    async fn failed_provider_count_still_collects_wallets() {
        let source = registry(3);
        source.fail(Failure::ProviderCount);

        let report = collector(source, vec![wallet(0xa1, "client")], 2)
            .collect(&CancellationToken::new())
            .await;

        assert_eq!(report.snapshot.len(), 1);
        assert_eq!(report.entity_errors.len(), 1);
        assert_eq!(report.entity_errors[0].entity, EntityId::Registry);
        assert_eq!(report.entity_errors[0].call(), RemoteCall::ProviderCount);
    }

    #[tokio::test]
    async fn failed_approved_set_degrades() {
        let source = registry(2);
        source.approve(1);
        source.fail(Failure::ApprovedProviders);

        let report = collector(source, vec![], 2)
            .collect(&CancellationToken::new())
            .await;

        assert_eq!(report.snapshot.len(), 2);
        assert!(report.entity_errors.is_empty());
        assert_eq!(report.field_errors.len(), 1);
        assert!(
            report
                .snapshot
                .records()
                .iter()
                .all(|r| r.provider.is_some_and(|p| !p.is_approved))
        );
    }

    #[tokio::test]
    async fn empty_registry_and_no_wallets_is_an_empty_snapshot() {
        let report = collector(Arc::new(FakeSource::default()), vec![], 1)
            .collect(&CancellationToken::new())
            .await;

        assert!(report.snapshot.is_empty());
        assert!(report.entity_errors.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_calls_never_exceed_the_ceiling() {
        for max in [1, 2, 5] {
            let source = registry(12);
            let prober = Arc::new(source.prober());
            for id in 1..=12 {
                source.set_product(id, pdp_product(&format!("https://sp{id}.example")));
                prober.respond(
                    &format!("https://sp{id}.example/pdp/ping"),
                    Duration::from_millis(5),
                );
            }
            source.set_latency(Duration::from_millis(5));
            let wallets = (0..6).map(|b| wallet(0xb0 + b, "w")).collect();

            let report = Collector::new(source.clone(), prober, Address::ZERO, wallets, max)
                .collect(&CancellationToken::new())
                .await;

            assert_eq!(report.snapshot.len(), 18);
            assert!(report.snapshot.records()[..12].iter().all(|r| r.ping.is_some()));
            assert!(
                source.peak_in_flight() <= max,
                "peak {} exceeded ceiling {max}",
                source.peak_in_flight()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_the_cycle() {
        let source = registry(4);
        source.set_latency(Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let report = collector(source, vec![], 2).collect(&cancel).await;
        assert!(report.cancelled);
        assert!(report.snapshot.is_empty());
    }
}
