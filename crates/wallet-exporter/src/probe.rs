//! Service endpoint discovery and health probing for providers.
//!
//! The probe pipeline runs alongside balance enrichment and never fails a
//! cycle: a missing capability, an inactive product, a failed lookup or an
//! unreachable endpoint all end in "no result" or an unsuccessful ping.

use crate::{
    error::ProbeError,
    model::PingResult,
    pool::WorkerPool,
    source::{
        DataSource,
        Prober,
        ProductInfo,
    },
};
use std::{
    collections::HashMap,
    convert::Infallible,
    sync::Arc,
    time::Duration,
};
use tracing::debug;

/// Capability key holding the provider's service endpoint.
pub const SERVICE_URL_CAPABILITY: &str = "serviceURL";

pub const HEALTH_PATH: &str = "/pdp/ping";

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint advertised by an active product of an active provider, without a
/// trailing slash.
pub fn discover_endpoint(product: &ProductInfo) -> Option<String> {
    if !product.is_active || !product.provider_active {
        return None;
    }
    let raw = product.capability(SERVICE_URL_CAPABILITY)?;
    let endpoint = std::str::from_utf8(raw).ok()?.trim().trim_end_matches('/');
    (!endpoint.is_empty()).then(|| endpoint.to_string())
}

pub fn health_url(endpoint: &str) -> String {
    format!("{endpoint}{HEALTH_PATH}")
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Clone)]
pub struct ProbePipeline {
    source: Arc<dyn DataSource>,
    prober: Arc<dyn Prober>,
    timeout: Duration,
}

impl ProbePipeline {
    pub fn new(source: Arc<dyn DataSource>, prober: Arc<dyn Prober>) -> Self {
        Self {
            source,
            prober,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Probes every provider in `ids` through `pool`. ID 0 is skipped.
    ///
    /// Providers without a discoverable endpoint are absent from the result.
    pub async fn run<I>(&self, pool: &WorkerPool, ids: I) -> HashMap<u64, PingResult>
    where
        I: IntoIterator<Item = u64>,
    {
        let outcome = pool
            .run(ids.into_iter().filter(|id| *id != 0), |id| {
                let pipeline = self.clone();
                async move {
                    let ping = pipeline.probe_provider(id).await;
                    Ok::<_, Infallible>(ping.map(|ping| (id, ping)))
                }
            })
            .await;

        outcome.completed.into_iter().flatten().collect()
    }

    async fn probe_provider(&self, id: u64) -> Option<PingResult> {
        let product = match self.source.provider_product(id).await {
            Ok(Some(product)) => product,
            Ok(None) => return None,
            Err(error) => {
                debug!(provider_id = id, %error, "Product lookup failed, skipping probe");
                return None;
            }
        };
        let endpoint = discover_endpoint(&product)?;
        let url = health_url(&endpoint);

        let result = match tokio::time::timeout(self.timeout, self.prober.probe(&url)).await {
            Ok(result) => result,
            Err(_elapsed) => Err((ProbeError::Timeout, self.timeout)),
        };

        let (success, elapsed) = match result {
            Ok(elapsed) => (true, elapsed),
            Err((error, elapsed)) => {
                debug!(provider_id = id, %url, %error, "Health probe failed");
                (false, elapsed)
            }
        };

        Some(PingResult {
            success,
            duration_ms: as_millis(elapsed),
            service_url: endpoint,
        })
    }
}
