use alloy::primitives::Address;
use std::{
    fmt,
    io,
    net::SocketAddr,
};
use thiserror::Error;

/// Fatal errors. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to connect to RPC endpoint {url}")]
    Connect {
        url: String,
        #[source]
        source: SourceError,
    },
    #[error("failed to resolve {contract} address from warm storage service {warm_storage}")]
    ResolveAddress {
        contract: &'static str,
        warm_storage: Address,
        #[source]
        source: SourceError,
    },
    #[error("failed to bind HTTP server address: {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("HTTP server error on {addr}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to build probe client: {0}")]
    ProbeClient(#[source] reqwest::Error),
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Remote calls issued against the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    ChainId,
    ViewContractAddress,
    RegistryAddress,
    NativeBalance,
    TokenBalance,
    ProviderCount,
    Provider,
    ApprovedProviders,
    PaymentAccount,
    ProviderProduct,
}

impl RemoteCall {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChainId => "chain_id",
            Self::ViewContractAddress => "view_contract_address",
            Self::RegistryAddress => "registry_address",
            Self::NativeBalance => "native_balance",
            Self::TokenBalance => "token_balance",
            Self::ProviderCount => "provider_count",
            Self::Provider => "provider",
            Self::ApprovedProviders => "approved_providers",
            Self::PaymentAccount => "payment_account",
            Self::ProviderProduct => "provider_product",
        }
    }
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{call} call failed: {message}")]
pub struct SourceError {
    pub call: RemoteCall,
    pub message: String,
}

impl SourceError {
    pub fn new(call: RemoteCall, err: impl fmt::Display) -> Self {
        Self {
            call,
            message: err.to_string(),
        }
    }
}

/// Which entity a per-entity or per-field error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Registry-level lookups that are not tied to a single entity.
    Registry,
    Provider(u64),
    Wallet(Address),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => f.write_str("provider registry"),
            Self::Provider(id) => write!(f, "provider {id}"),
            Self::Wallet(address) => write!(f, "custom wallet {address}"),
        }
    }
}

/// Foundational lookup failed; the entity is dropped from the snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to fetch {entity}")]
pub struct FetchError {
    pub entity: EntityId,
    #[source]
    pub source: SourceError,
}

impl FetchError {
    /// The remote call behind the failure.
    pub fn call(&self) -> RemoteCall {
        self.source.call
    }
}

/// Secondary lookup failed; the field falls back to its zero value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to fetch {field} for {entity}, using default")]
pub struct FieldError {
    pub entity: EntityId,
    pub field: &'static str,
    #[source]
    pub source: SourceError,
}

/// Health probe failures. Recorded as an unsuccessful ping, never counted as
/// a scrape error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("probe request failed: {0}")]
    Transport(String),
    #[error("probe returned HTTP status {0}")]
    Status(u16),
}
