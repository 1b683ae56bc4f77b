//! Builds one [`EntityRecord`] from a provider ID or a configured wallet.

use crate::{
    config::CustomWallet,
    error::{
        EntityId,
        FetchError,
        FieldError,
        SourceError,
    },
    model::{
        EntityRecord,
        ProviderFacts,
    },
    source::DataSource,
};
use alloy::primitives::Address;
use std::{
    future::Future,
    sync::Arc,
};
use tracing::debug;

/// One unit of enrichment work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityTarget {
    Provider { id: u64, approved: bool },
    Wallet(CustomWallet),
}

impl EntityTarget {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Provider { id, .. } => EntityId::Provider(*id),
            Self::Wallet(wallet) => EntityId::Wallet(wallet.address),
        }
    }
}

/// A finished record plus the secondary lookups that fell back to defaults.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub record: EntityRecord,
    pub degraded: Vec<FieldError>,
}

#[derive(Clone)]
pub struct Enricher {
    source: Arc<dyn DataSource>,
    payment_token: Address,
}

impl Enricher {
    pub fn new(source: Arc<dyn DataSource>, payment_token: Address) -> Self {
        Self {
            source,
            payment_token,
        }
    }

    /// Fails only when a foundational lookup fails: provider base info, or the
    /// native balance. Every other field degrades to zero.
    pub async fn enrich(&self, target: EntityTarget) -> Result<Enriched, FetchError> {
        let entity = target.entity_id();
        let fail = |source| FetchError { entity, source };

        let record = match target {
            EntityTarget::Provider { id, approved } => {
                let info = self.source.provider(id).await.map_err(fail)?;
                EntityRecord::provider(
                    info.service_provider,
                    info.name,
                    info.description,
                    ProviderFacts {
                        id,
                        is_active: info.is_active,
                        is_approved: approved,
                    },
                )
            }
            EntityTarget::Wallet(wallet) => {
                EntityRecord::wallet(wallet.address, wallet.name, wallet.kind)
            }
        };

        let native = self
            .source
            .native_balance(record.address)
            .await
            .map_err(fail)?;

        let mut degraded = Vec::new();
        let token = degrade(entity, "token_balance", &mut degraded, || {
            self.source.token_balance(record.address)
        })
        .await;
        let payment = degrade(entity, "payment_account", &mut degraded, || {
            self.source
                .payment_account(self.payment_token, record.address)
        })
        .await;

        Ok(Enriched {
            record: record.with_balances(native, token).with_payment(payment),
            degraded,
        })
    }
}

async fn degrade<T, F, Fut>(
    entity: EntityId,
    field: &'static str,
    degraded: &mut Vec<FieldError>,
    lookup: F,
) -> T
where
    T: Default,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    match lookup().await {
        Ok(value) => value,
        Err(source) => {
            debug!(%entity, field, error = %source, "Secondary lookup failed, using default");
            degraded.push(FieldError {
                entity,
                field,
                source,
            });
            T::default()
        }
    }
}
