#![cfg(any(test, feature = "test"))]

//! In-memory fakes for [`DataSource`] and [`Prober`], plus helpers for
//! reading values back out of a Prometheus registry.

use crate::{
    error::{
        ProbeError,
        RemoteCall,
        SourceError,
    },
    model::PaymentAccount,
    source::{
        DataSource,
        Prober,
        ProductInfo,
        ProviderInfo,
    },
};
use alloy::primitives::{
    Address,
    U256,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus::{
    Registry,
    proto::MetricType,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};

/// One whole token in base units.
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

pub fn tokens(amount: u64) -> U256 {
    U256::from(amount) * U256::from(ONE_TOKEN)
}

pub fn provider_info(address: Address, name: &str) -> ProviderInfo {
    ProviderInfo {
        service_provider: address,
        name: name.to_string(),
        description: format!("{name} description"),
        is_active: true,
    }
}

/// Product carrying a single `serviceURL` capability.
pub fn pdp_product(service_url: &str) -> ProductInfo {
    ProductInfo {
        is_active: true,
        provider_active: true,
        capabilities: vec![("serviceURL".to_string(), service_url.as_bytes().to_vec())],
    }
}

/// A remote call the fake should fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Failure {
    NativeBalance(Address),
    TokenBalance(Address),
    PaymentAccount(Address),
    Provider(u64),
    ProviderProduct(u64),
    ProviderCount,
    ApprovedProviders,
}

impl Failure {
    fn call(&self) -> RemoteCall {
        match self {
            Self::NativeBalance(_) => RemoteCall::NativeBalance,
            Self::TokenBalance(_) => RemoteCall::TokenBalance,
            Self::PaymentAccount(_) => RemoteCall::PaymentAccount,
            Self::Provider(_) => RemoteCall::Provider,
            Self::ProviderProduct(_) => RemoteCall::ProviderProduct,
            Self::ProviderCount => RemoteCall::ProviderCount,
            Self::ApprovedProviders => RemoteCall::ApprovedProviders,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    providers: BTreeMap<u64, ProviderInfo>,
    provider_count: Option<u64>,
    approved: HashSet<u64>,
    native: HashMap<Address, U256>,
    token: HashMap<Address, U256>,
    payment: HashMap<Address, PaymentAccount>,
    products: HashMap<u64, ProductInfo>,
    failures: HashSet<Failure>,
    latency: Duration,
}

/// Counts remote calls and tracks how many were in flight at once.
#[derive(Debug, Default)]
struct CallGauge {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CallGauge {
    /// Marks one call in flight until the returned guard is dropped.
    fn enter(&self) -> InFlight<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

struct InFlight<'a>(&'a CallGauge);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Programmable [`DataSource`].
///
/// Unset balances and accounts read as zero. The provider count defaults to
/// the highest registered ID. Every call is counted and the number of calls
/// in flight at once is tracked, together with the probes of any
/// [`FakeProber`] created through [`FakeSource::prober`].
#[derive(Debug, Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
    gauge: Arc<CallGauge>,
}

impl FakeSource {
    pub fn add_provider(&self, id: u64, info: ProviderInfo) {
        self.state.lock().providers.insert(id, info);
    }

    pub fn set_provider_count(&self, count: u64) {
        self.state.lock().provider_count = Some(count);
    }

    pub fn approve(&self, id: u64) {
        self.state.lock().approved.insert(id);
    }

    pub fn set_native_balance(&self, address: Address, value: U256) {
        self.state.lock().native.insert(address, value);
    }

    pub fn set_token_balance(&self, address: Address, value: U256) {
        self.state.lock().token.insert(address, value);
    }

    pub fn set_payment_account(&self, address: Address, account: PaymentAccount) {
        self.state.lock().payment.insert(address, account);
    }

    pub fn set_product(&self, id: u64, product: ProductInfo) {
        self.state.lock().products.insert(id, product);
    }

    pub fn fail(&self, failure: Failure) {
        self.state.lock().failures.insert(failure);
    }

    /// Delay applied to every call before it answers.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// A prober whose probes count towards this source's in-flight calls.
    pub fn prober(&self) -> FakeProber {
        FakeProber {
            gauge: self.gauge.clone(),
            ..FakeProber::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.gauge.calls.load(Ordering::SeqCst)
    }

    /// Highest number of remote calls, data source and probes combined, that
    /// were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    async fn answer<T>(
        &self,
        failure: Failure,
        read: impl FnOnce(&FakeState) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let in_flight = self.gauge.enter();
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        drop(in_flight);

        let state = self.state.lock();
        if state.failures.contains(&failure) {
            return Err(SourceError::new(failure.call(), "injected failure"));
        }
        read(&state)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn native_balance(&self, address: Address) -> Result<U256, SourceError> {
        self.answer(Failure::NativeBalance(address), |s| {
            Ok(s.native.get(&address).copied().unwrap_or_default())
        })
        .await
    }

    async fn token_balance(&self, address: Address) -> Result<U256, SourceError> {
        self.answer(Failure::TokenBalance(address), |s| {
            Ok(s.token.get(&address).copied().unwrap_or_default())
        })
        .await
    }

    async fn provider_count(&self) -> Result<u64, SourceError> {
        self.answer(Failure::ProviderCount, |s| {
            Ok(s
                .provider_count
                .or_else(|| s.providers.keys().next_back().copied())
                .unwrap_or_default())
        })
        .await
    }

    async fn provider(&self, id: u64) -> Result<ProviderInfo, SourceError> {
        self.answer(Failure::Provider(id), |s| {
            s.providers
                .get(&id)
                .cloned()
                .ok_or_else(|| SourceError::new(RemoteCall::Provider, "provider not found"))
        })
        .await
    }

    async fn approved_provider_ids(&self) -> Result<HashSet<u64>, SourceError> {
        self.answer(Failure::ApprovedProviders, |s| Ok(s.approved.clone()))
            .await
    }

    async fn payment_account(
        &self,
        _token: Address,
        owner: Address,
    ) -> Result<PaymentAccount, SourceError> {
        self.answer(Failure::PaymentAccount(owner), |s| {
            Ok(s.payment.get(&owner).copied().unwrap_or_default())
        })
        .await
    }

    async fn provider_product(&self, id: u64) -> Result<Option<ProductInfo>, SourceError> {
        self.answer(Failure::ProviderProduct(id), |s| {
            let provider_active = s.providers.get(&id).is_none_or(|info| info.is_active);
            Ok(s.products.get(&id).cloned().map(|product| ProductInfo {
                provider_active,
                ..product
            }))
        })
        .await
    }
}

#[derive(Debug, Clone)]
enum ProbeReply {
    Respond(Result<Duration, ProbeError>),
    Hang,
}

/// Programmable [`Prober`]. URLs without a configured reply fail with a
/// transport error. A configured latency is actually waited out.
#[derive(Debug, Default)]
pub struct FakeProber {
    replies: Mutex<HashMap<String, ProbeReply>>,
    probed: Mutex<Vec<String>>,
    gauge: Arc<CallGauge>,
}

impl FakeProber {
    pub fn respond(&self, url: &str, latency: Duration) {
        self.replies
            .lock()
            .insert(url.to_string(), ProbeReply::Respond(Ok(latency)));
    }

    pub fn reject(&self, url: &str, err: ProbeError) {
        self.replies
            .lock()
            .insert(url.to_string(), ProbeReply::Respond(Err(err)));
    }

    /// The probe never answers, so only a caller-side timeout ends it.
    pub fn hang(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), ProbeReply::Hang);
    }

    /// Every URL probed so far, in call order.
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, url: &str) -> Result<Duration, (ProbeError, Duration)> {
        self.probed.lock().push(url.to_string());
        let reply = self.replies.lock().get(url).cloned();
        let _in_flight = self.gauge.enter();

        match reply {
            Some(ProbeReply::Respond(Ok(latency))) => {
                tokio::time::sleep(latency).await;
                Ok(latency)
            }
            Some(ProbeReply::Respond(Err(err))) => Err((err, Duration::from_millis(1))),
            Some(ProbeReply::Hang) => std::future::pending().await,
            None => Err((
                ProbeError::Transport("connection refused".to_string()),
                Duration::ZERO,
            )),
        }
    }
}

/// Value of the series of family `name` whose labels include every pair in
/// `labels`. Reads gauges and counters.
pub fn metric_value(registry: &Registry, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    registry
        .gather()
        .into_iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| {
            let kind = family.get_field_type();
            family
                .get_metric()
                .iter()
                .filter(|metric| {
                    labels.iter().all(|(key, value)| {
                        metric
                            .get_label()
                            .iter()
                            .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
                    })
                })
                .map(|metric| {
                    if kind == MetricType::COUNTER {
                        metric.get_counter().get_value()
                    } else {
                        metric.get_gauge().get_value()
                    }
                })
                .collect::<Vec<_>>()
        })
        .next()
}

/// Number of series currently exported for family `name`.
pub fn series_count(registry: &Registry, name: &str) -> usize {
    registry
        .gather()
        .iter()
        .filter(|family| family.get_name() == name)
        .map(|family| family.get_metric().len())
        .sum()
}
