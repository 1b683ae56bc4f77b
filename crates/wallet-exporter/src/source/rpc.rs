//! [`DataSource`] backed by an Ethereum-compatible JSON-RPC endpoint.

use super::{
    DataSource,
    ProductInfo,
    ProviderInfo,
    contracts::{
        IERC20,
        IPayments,
        IServiceProviderRegistry,
        IWarmStorageService,
        IWarmStorageView,
        PDP_PRODUCT_TYPE,
    },
};
use crate::{
    error::{
        ExporterError,
        RemoteCall,
        SourceError,
    },
    model::PaymentAccount,
};
use alloy::{
    primitives::{
        Address,
        U256,
    },
    providers::{
        Provider,
        ProviderBuilder,
        RootProvider,
    },
};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{
    info,
    instrument,
};
use url::Url;

/// Contract-backed data source.
///
/// The view contract and provider registry are resolved from the warm storage
/// service once, at startup.
#[derive(Debug, Clone)]
pub struct RpcSource {
    provider: RootProvider,
    token: Address,
    payments: Address,
    view: Address,
    registry: Address,
}

impl RpcSource {
    /// Connects to the endpoint and resolves the dependent contract addresses.
    ///
    /// Every failure here is fatal for the process.
    #[instrument(name = "rpc_source::connect", skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(
        rpc_url: Url,
        warm_storage: Address,
        token: Address,
        payments: Address,
    ) -> Result<Self, ExporterError> {
        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.clone())
            .root()
            .clone();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ExporterError::Connect {
                url: rpc_url.to_string(),
                source: SourceError::new(RemoteCall::ChainId, e),
            })?;

        let service = IWarmStorageService::new(warm_storage, provider.clone());
        let view = service
            .viewContractAddress()
            .call()
            .await
            .map_err(|e| ExporterError::ResolveAddress {
                contract: "view contract",
                warm_storage,
                source: SourceError::new(RemoteCall::ViewContractAddress, e),
            })?;
        let registry = service
            .serviceProviderRegistry()
            .call()
            .await
            .map_err(|e| ExporterError::ResolveAddress {
                contract: "service provider registry",
                warm_storage,
                source: SourceError::new(RemoteCall::RegistryAddress, e),
            })?;

        info!(
            chain_id,
            %warm_storage,
            %view,
            %registry,
            "Resolved storage service contracts"
        );

        Ok(Self {
            provider,
            token,
            payments,
            view,
            registry,
        })
    }

    fn registry(&self) -> IServiceProviderRegistry::IServiceProviderRegistryInstance<RootProvider> {
        IServiceProviderRegistry::new(self.registry, self.provider.clone())
    }
}

fn to_u64(value: U256, call: RemoteCall) -> Result<u64, SourceError> {
    u64::try_from(value).map_err(|_| SourceError::new(call, format!("{value} does not fit in u64")))
}

#[async_trait]
impl DataSource for RpcSource {
    async fn native_balance(&self, address: Address) -> Result<U256, SourceError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| SourceError::new(RemoteCall::NativeBalance, e))
    }

    async fn token_balance(&self, address: Address) -> Result<U256, SourceError> {
        IERC20::new(self.token, self.provider.clone())
            .balanceOf(address)
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::TokenBalance, e))
    }

    async fn provider_count(&self) -> Result<u64, SourceError> {
        let count = self
            .registry()
            .getProviderCount()
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::ProviderCount, e))?;
        to_u64(count, RemoteCall::ProviderCount)
    }

    async fn provider(&self, id: u64) -> Result<ProviderInfo, SourceError> {
        let view = self
            .registry()
            .getProvider(U256::from(id))
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::Provider, e))?;

        Ok(ProviderInfo {
            service_provider: view.info.serviceProvider,
            name: view.info.name,
            description: view.info.description,
            is_active: view.info.isActive,
        })
    }

    async fn approved_provider_ids(&self) -> Result<HashSet<u64>, SourceError> {
        // offset 0, limit 0 returns the whole set
        let ids = IWarmStorageView::new(self.view, self.provider.clone())
            .getApprovedProviders(U256::ZERO, U256::ZERO)
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::ApprovedProviders, e))?;

        ids.into_iter()
            .map(|id| to_u64(id, RemoteCall::ApprovedProviders))
            .collect()
    }

    async fn payment_account(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<PaymentAccount, SourceError> {
        let info = IPayments::new(self.payments, self.provider.clone())
            .getAccountInfoIfSettled(token, owner)
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::PaymentAccount, e))?;

        Ok(PaymentAccount {
            funds: info.currentFunds,
            available: info.availableFunds,
            funded_until_epoch: info.fundedUntilEpoch,
        })
    }

    async fn provider_product(&self, id: u64) -> Result<Option<ProductInfo>, SourceError> {
        let with_product = self
            .registry()
            .getProviderWithProduct(U256::from(id), PDP_PRODUCT_TYPE)
            .call()
            .await
            .map_err(|e| SourceError::new(RemoteCall::ProviderProduct, e))?;

        let product = with_product.product;
        if product.capabilityKeys.is_empty() && !product.isActive {
            return Ok(None);
        }

        let capabilities = product
            .capabilityKeys
            .into_iter()
            .zip(
                with_product
                    .productCapabilityValues
                    .into_iter()
                    .map(|value| value.to_vec()),
            )
            .collect();

        Ok(Some(ProductInfo {
            is_active: product.isActive,
            provider_active: with_product.providerInfo.isActive,
            capabilities,
        }))
    }
}
