//! Prometheus metrics for published snapshots.
//!
//! Every family is registered on a registry owned by the [`MetricPublisher`].
//! Per-entity families are cleared before each snapshot is written, so an
//! entity that disappears between cycles leaves no series behind.
//!
//! Balance, payment and info families share one label set:
//!
//! | label | providers | custom wallets |
//! |---|---|---|
//! | `address` | checksummed address | checksummed address |
//! | `name` | registry name | configured name |
//! | `type` | `provider` | `client`, `operator` or `other` |
//! | `provider_id` | registry ID | empty |
//! | `is_active` | `true` / `false` | empty |
//! | `approved` | `true` / `false` | empty |

#![allow(clippy::cast_precision_loss)]

use crate::{
    collector::CycleReport,
    error::ExporterError,
    model::{
        EntityRecord,
        epoch_to_f64,
        to_display_units,
    },
    snapshot::Snapshot,
};
use parking_lot::Mutex;
use prometheus::{
    Encoder,
    Gauge,
    GaugeVec,
    IntCounterVec,
    IntGauge,
    Opts,
    Registry,
    TextEncoder,
};

const WALLET_LABELS: [&str; 6] = [
    "address",
    "name",
    "type",
    "provider_id",
    "is_active",
    "approved",
];
const INFO_LABELS: [&str; 7] = [
    "address",
    "name",
    "type",
    "provider_id",
    "is_active",
    "approved",
    "description",
];
const PING_LABELS: [&str; 4] = ["address", "name", "provider_id", "service_url"];

pub const STAGE_ENTITY: &str = "entity";
pub const STAGE_FIELD: &str = "field";

/// Label values shared by every per-wallet family.
///
/// Provider-only labels are empty strings for other kinds, so every series of
/// a family has the same label names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletLabels {
    pub address: String,
    pub name: String,
    pub kind: &'static str,
    pub provider_id: String,
    pub is_active: String,
    pub approved: String,
}

impl WalletLabels {
    pub fn from_record(record: &EntityRecord) -> Self {
        let (provider_id, is_active, approved) = match record.provider {
            Some(facts) => (
                facts.id.to_string(),
                facts.is_active.to_string(),
                facts.is_approved.to_string(),
            ),
            None => (String::new(), String::new(), String::new()),
        };

        Self {
            address: record.address.to_string(),
            name: record.name.clone(),
            kind: record.kind.as_str(),
            provider_id,
            is_active,
            approved,
        }
    }

    fn values(&self) -> [&str; 6] {
        [
            &self.address,
            &self.name,
            self.kind,
            &self.provider_id,
            &self.is_active,
            &self.approved,
        ]
    }
}

fn gauge_vec(
    registry: &Registry,
    prefix: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, ExporterError> {
    let gauge = GaugeVec::new(Opts::new(format!("{prefix}_{name}"), help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge(
    registry: &Registry,
    prefix: &str,
    name: &str,
    help: &str,
) -> Result<Gauge, ExporterError> {
    let gauge = Gauge::with_opts(Opts::new(format!("{prefix}_{name}"), help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub struct MetricPublisher {
    registry: Registry,
    fil_balance: GaugeVec,
    usdfc_balance: GaugeVec,
    wallet_info: GaugeVec,
    payments_funds: GaugeVec,
    payments_available: GaugeVec,
    payments_locked: GaugeVec,
    payments_funded_until_epoch: GaugeVec,
    ping_success: GaugeVec,
    ping_duration_ms: GaugeVec,
    scrape_duration: Gauge,
    last_scrape_timestamp: Gauge,
    wallets_monitored: IntGauge,
    scrape_errors: IntCounterVec,
    /// Held while a snapshot is written and while the registry is encoded.
    publish_lock: Mutex<()>,
}

impl MetricPublisher {
    pub fn new(prefix: &str) -> Result<Self, ExporterError> {
        let registry = Registry::new();
        let r = &registry;

        let wallets_monitored = IntGauge::with_opts(Opts::new(
            format!("{prefix}_wallets_monitored"),
            "Number of wallets in the current snapshot",
        ))?;
        registry.register(Box::new(wallets_monitored.clone()))?;

        let scrape_errors = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_scrape_errors_total"),
                "Scrape errors by stage: dropped entities or defaulted fields",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(scrape_errors.clone()))?;
        for stage in [STAGE_ENTITY, STAGE_FIELD] {
            scrape_errors.with_label_values(&[stage]);
        }

        Ok(Self {
            fil_balance: gauge_vec(
                r,
                prefix,
                "wallet_fil_balance",
                "FIL balance of the wallet",
                &WALLET_LABELS,
            )?,
            usdfc_balance: gauge_vec(
                r,
                prefix,
                "wallet_usdfc_balance",
                "USDFC balance of the wallet",
                &WALLET_LABELS,
            )?,
            wallet_info: gauge_vec(
                r,
                prefix,
                "wallet_info",
                "Wallet metadata, always 1",
                &INFO_LABELS,
            )?,
            payments_funds: gauge_vec(
                r,
                prefix,
                "wallet_payments_funds",
                "Total USDFC funds in the payments contract",
                &WALLET_LABELS,
            )?,
            payments_available: gauge_vec(
                r,
                prefix,
                "wallet_payments_available",
                "USDFC funds available for withdrawal",
                &WALLET_LABELS,
            )?,
            payments_locked: gauge_vec(
                r,
                prefix,
                "wallet_payments_locked",
                "USDFC funds locked in payment rails",
                &WALLET_LABELS,
            )?,
            payments_funded_until_epoch: gauge_vec(
                r,
                prefix,
                "wallet_payments_funded_until_epoch",
                "Epoch until which the account is funded",
                &WALLET_LABELS,
            )?,
            ping_success: gauge_vec(
                r,
                prefix,
                "provider_ping_success",
                "Whether the provider health check succeeded",
                &PING_LABELS,
            )?,
            ping_duration_ms: gauge_vec(
                r,
                prefix,
                "provider_ping_duration_ms",
                "Provider health check latency in milliseconds",
                &PING_LABELS,
            )?,
            scrape_duration: gauge(
                r,
                prefix,
                "scrape_duration_seconds",
                "Duration of the last scrape",
            )?,
            last_scrape_timestamp: gauge(
                r,
                prefix,
                "last_scrape_timestamp_seconds",
                "Unix time of the last published snapshot",
            )?,
            wallets_monitored,
            scrape_errors,
            publish_lock: Mutex::new(()),
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn per_entity_families(&self) -> [&GaugeVec; 9] {
        [
            &self.fil_balance,
            &self.usdfc_balance,
            &self.wallet_info,
            &self.payments_funds,
            &self.payments_available,
            &self.payments_locked,
            &self.payments_funded_until_epoch,
            &self.ping_success,
            &self.ping_duration_ms,
        ]
    }

    /// Replaces every per-entity series with the contents of `snapshot`.
    pub fn publish(&self, snapshot: &Snapshot) {
        let _guard = self.publish_lock.lock();

        for family in self.per_entity_families() {
            family.reset();
        }

        for record in snapshot.records() {
            let labels = WalletLabels::from_record(record);
            let values = labels.values();

            self.fil_balance
                .with_label_values(&values)
                .set(to_display_units(record.native_balance));
            self.usdfc_balance
                .with_label_values(&values)
                .set(to_display_units(record.token_balance));

            let mut info = values.to_vec();
            info.push(&record.description);
            self.wallet_info.with_label_values(&info).set(1.0);

            let payment = &record.payment;
            self.payments_funds
                .with_label_values(&values)
                .set(to_display_units(payment.funds));
            self.payments_available
                .with_label_values(&values)
                .set(to_display_units(payment.available));
            self.payments_locked
                .with_label_values(&values)
                .set(to_display_units(payment.locked()));
            self.payments_funded_until_epoch
                .with_label_values(&values)
                .set(epoch_to_f64(payment.funded_until_epoch));

            if let Some(ping) = &record.ping {
                let ping_labels = [
                    labels.address.as_str(),
                    labels.name.as_str(),
                    labels.provider_id.as_str(),
                    ping.service_url.as_str(),
                ];
                self.ping_success
                    .with_label_values(&ping_labels)
                    .set(if ping.success { 1.0 } else { 0.0 });
                self.ping_duration_ms
                    .with_label_values(&ping_labels)
                    .set(ping.duration_ms as f64);
            }
        }

        self.wallets_monitored
            .set(i64::try_from(snapshot.len()).unwrap_or(i64::MAX));
        if let Some(captured_at) = snapshot.captured_at() {
            self.last_scrape_timestamp
                .set(captured_at.timestamp_millis() as f64 / 1000.0);
        }
    }

    /// Records duration and error counts of a finished cycle.
    pub fn record_cycle(&self, report: &CycleReport) {
        self.scrape_duration.set(report.duration.as_secs_f64());
        self.scrape_errors
            .with_label_values(&[STAGE_ENTITY])
            .inc_by(report.entity_failures() as u64);
        self.scrape_errors
            .with_label_values(&[STAGE_FIELD])
            .inc_by(report.field_errors.len() as u64);
    }

    /// Text exposition of the whole registry.
    pub fn encode(&self) -> Result<String, ExporterError> {
        let families = {
            let _guard = self.publish_lock.lock();
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{
            PaymentAccount,
            PingResult,
            ProviderFacts,
            WalletKind,
        },
        test_utils::{
            metric_value,
            series_count,
            tokens,
        },
    };
    use alloy::primitives::{
        Address,
        U256,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn provider(id: u64, byte: u8) -> EntityRecord {
        EntityRecord::provider(
            Address::repeat_byte(byte),
            format!("sp{id}"),
            "storage",
            ProviderFacts {
                id,
                is_active: true,
                is_approved: id == 2,
            },
        )
        .with_balances(tokens(id), tokens(0))
    }

    fn client() -> EntityRecord {
        EntityRecord::wallet(Address::repeat_byte(0xc1), "client", WalletKind::Client)
            .with_balances(tokens(3), tokens(4))
    }

    fn snapshot(records: Vec<EntityRecord>) -> Snapshot {
        Snapshot::new(records, Utc::now())
    }

    #[test]
    fn labels_for_non_providers_are_empty() {
        let labels = WalletLabels::from_record(&client());
        assert_eq!(labels.kind, "client");
        assert_eq!(labels.provider_id, "");
        assert_eq!(labels.is_active, "");
        assert_eq!(labels.approved, "");

        let labels = WalletLabels::from_record(&provider(2, 2));
        assert_eq!(labels.provider_id, "2");
        assert_eq!(labels.is_active, "true");
        assert_eq!(labels.approved, "true");
    }

    #[test]
    fn publishes_balances_in_display_units() {
        let publisher = MetricPublisher::new("test").unwrap();
        publisher.publish(&snapshot(vec![provider(1, 1), client()]));
        let registry = publisher.registry();

        assert_eq!(
            metric_value(registry, "test_wallet_fil_balance", &[("provider_id", "1")]),
            Some(1.0)
        );
        assert_eq!(
            metric_value(registry, "test_wallet_usdfc_balance", &[("type", "client")]),
            Some(4.0)
        );
        assert_eq!(
            metric_value(registry, "test_wallet_info", &[("description", "storage")]),
            Some(1.0)
        );
        assert_eq!(metric_value(registry, "test_wallets_monitored", &[]), Some(2.0));
    }

    #[test]
    fn payment_figures_and_locked_amount() {
        let record = client().with_payment(PaymentAccount {
            funds: tokens(10),
            available: tokens(4),
            funded_until_epoch: U256::MAX,
        });
        let publisher = MetricPublisher::new("test").unwrap();
        publisher.publish(&snapshot(vec![record]));
        let registry = publisher.registry();

        assert_eq!(
            metric_value(registry, "test_wallet_payments_locked", &[]),
            Some(6.0)
        );
        assert_eq!(
            metric_value(registry, "test_wallet_payments_funded_until_epoch", &[]),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn ping_series_only_for_probed_providers() {
        let probed = provider(1, 1).with_ping(Some(PingResult {
            success: false,
            duration_ms: 120,
            service_url: "https://sp.example".into(),
        }));
        let publisher = MetricPublisher::new("test").unwrap();
        publisher.publish(&snapshot(vec![probed, provider(2, 2), client()]));
        let registry = publisher.registry();

        assert_eq!(series_count(registry, "test_provider_ping_success"), 1);
        assert_eq!(
            metric_value(
                registry,
                "test_provider_ping_success",
                &[("service_url", "https://sp.example")]
            ),
            Some(0.0)
        );
        assert_eq!(
            metric_value(registry, "test_provider_ping_duration_ms", &[]),
            Some(120.0)
        );
    }

    #[test]
    fn removed_entities_leave_no_series() {
        let publisher = MetricPublisher::new("test").unwrap();
        publisher.publish(&snapshot(vec![provider(1, 1), provider(2, 2), client()]));
        assert_eq!(series_count(publisher.registry(), "test_wallet_fil_balance"), 3);

        publisher.publish(&snapshot(vec![provider(1, 1)]));
        let registry = publisher.registry();
        assert_eq!(series_count(registry, "test_wallet_fil_balance"), 1);
        assert_eq!(series_count(registry, "test_wallet_info"), 1);
        assert_eq!(
            metric_value(registry, "test_wallet_fil_balance", &[("provider_id", "2")]),
            None
        );
    }

    #[test]
    fn republishing_the_same_snapshot_is_identical() {
        let publisher = MetricPublisher::new("test").unwrap();
        let snapshot = snapshot(vec![provider(1, 1), client()]);

        publisher.publish(&snapshot);
        let first = publisher.encode().unwrap();
        publisher.publish(&snapshot);
        assert_eq!(publisher.encode().unwrap(), first);
    }

    #[test]
    fn cycle_errors_are_counted_by_stage() {
        let publisher = MetricPublisher::new("test").unwrap();
        let registry = publisher.registry();
        assert_eq!(
            metric_value(registry, "test_scrape_errors_total", &[("stage", "entity")]),
            Some(0.0)
        );

        let report = CycleReport {
            panicked: 1,
            ..CycleReport::default()
        };
        publisher.record_cycle(&report);
        assert_eq!(
            metric_value(registry, "test_scrape_errors_total", &[("stage", "entity")]),
            Some(1.0)
        );
        assert_eq!(
            metric_value(registry, "test_scrape_errors_total", &[("stage", "field")]),
            Some(0.0)
        );
    }

    #[test]
    fn exposition_uses_the_prefix() {
        let publisher = MetricPublisher::new("dealbot").unwrap();
        publisher.publish(&snapshot(vec![client()]));
        let text = publisher.encode().unwrap();
        assert!(text.contains("# TYPE dealbot_wallet_fil_balance gauge"));
        assert!(text.contains("dealbot_scrape_errors_total{stage=\"entity\"} 0"));
    }
}
