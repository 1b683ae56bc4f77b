//! Capabilities the collection engine needs from the outside world.
//!
//! The engine only talks to [`DataSource`] and [`Prober`]. [`RpcSource`] and
//! [`HttpProber`] are the production implementations; tests use the fakes in
//! [`crate::test_utils`].

pub mod contracts;
pub mod http;
pub mod rpc;

pub use http::HttpProber;
pub use rpc::RpcSource;

use crate::{
    error::{
        ProbeError,
        SourceError,
    },
    model::PaymentAccount,
};
use alloy::primitives::{
    Address,
    U256,
};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    time::Duration,
};

/// Base info for one registered provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub service_provider: Address,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

/// Product metadata registered for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductInfo {
    pub is_active: bool,
    /// Active flag of the provider that registered the product.
    pub provider_active: bool,
    /// Capability key/value pairs in registry order.
    pub capabilities: Vec<(String, Vec<u8>)>,
}

impl ProductInfo {
    /// Value of the first capability whose key matches exactly.
    pub fn capability(&self, key: &str) -> Option<&[u8]> {
        self.capabilities
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

/// Remote data source for balances and registry state.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn native_balance(&self, address: Address) -> Result<U256, SourceError>;

    async fn token_balance(&self, address: Address) -> Result<U256, SourceError>;

    /// Number of registered providers. Provider IDs run from 1 to this value.
    async fn provider_count(&self) -> Result<u64, SourceError>;

    async fn provider(&self, id: u64) -> Result<ProviderInfo, SourceError>;

    async fn approved_provider_ids(&self) -> Result<HashSet<u64>, SourceError>;

    async fn payment_account(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<PaymentAccount, SourceError>;

    /// Product metadata for a provider, `None` when no product is registered.
    async fn provider_product(&self, id: u64) -> Result<Option<ProductInfo>, SourceError>;
}

/// HTTP health probe.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issues one GET against `url` and returns the elapsed time on success.
    async fn probe(&self, url: &str) -> Result<Duration, (ProbeError, Duration)>;
}
