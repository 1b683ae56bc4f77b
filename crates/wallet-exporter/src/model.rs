//! Observed state for one monitored address.
//!
//! An [`EntityRecord`] is assembled once per collection cycle by the
//! [`Enricher`](crate::enricher::Enricher) and is never mutated after it has
//! been placed into a [`Snapshot`](crate::snapshot::Snapshot).

#![allow(clippy::cast_precision_loss)]

use alloy::primitives::{
    Address,
    U256,
    utils::format_ether,
};
use std::{
    fmt,
    str::FromStr,
};

/// What kind of wallet a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Provider,
    Client,
    Operator,
    Other,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Client => "client",
            Self::Operator => "operator",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind tag accepted for statically configured wallets.
///
/// Providers are only ever discovered through the registry, so there is no
/// provider variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WalletKind {
    Client,
    Operator,
    #[default]
    Other,
}

impl From<WalletKind> for EntityKind {
    fn from(kind: WalletKind) -> Self {
        match kind {
            WalletKind::Client => Self::Client,
            WalletKind::Operator => Self::Operator,
            WalletKind::Other => Self::Other,
        }
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "operator" => Ok(Self::Operator),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid wallet kind: {s}")),
        }
    }
}

/// Registry facts that only exist for providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderFacts {
    pub id: u64,
    pub is_active: bool,
    pub is_approved: bool,
}

/// Escrow-style payment account for one (token, owner) pair, in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaymentAccount {
    pub funds: U256,
    pub available: U256,
    pub funded_until_epoch: U256,
}

impl PaymentAccount {
    /// Funds that are committed to lockups. Clamped at zero.
    pub fn locked(&self) -> U256 {
        self.funds.saturating_sub(self.available)
    }
}

/// Outcome of a health probe against a provider's service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub success: bool,
    pub duration_ms: u64,
    pub service_url: String,
}

/// One monitored address and everything observed about it in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub address: Address,
    pub name: String,
    pub description: String,
    pub kind: EntityKind,
    /// `Some` iff `kind == EntityKind::Provider`.
    pub provider: Option<ProviderFacts>,
    pub native_balance: U256,
    pub token_balance: U256,
    pub payment: PaymentAccount,
    pub ping: Option<PingResult>,
}

impl EntityRecord {
    pub fn provider(
        address: Address,
        name: impl Into<String>,
        description: impl Into<String>,
        facts: ProviderFacts,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            description: description.into(),
            kind: EntityKind::Provider,
            provider: Some(facts),
            native_balance: U256::ZERO,
            token_balance: U256::ZERO,
            payment: PaymentAccount::default(),
            ping: None,
        }
    }

    pub fn wallet(address: Address, name: impl Into<String>, kind: WalletKind) -> Self {
        Self {
            address,
            name: name.into(),
            description: String::new(),
            kind: kind.into(),
            provider: None,
            native_balance: U256::ZERO,
            token_balance: U256::ZERO,
            payment: PaymentAccount::default(),
            ping: None,
        }
    }

    #[must_use]
    pub fn with_balances(mut self, native: U256, token: U256) -> Self {
        self.native_balance = native;
        self.token_balance = token;
        self
    }

    #[must_use]
    pub fn with_payment(mut self, payment: PaymentAccount) -> Self {
        self.payment = payment;
        self
    }

    /// Attaches a probe result. Ignored for non-provider records.
    #[must_use]
    pub fn with_ping(mut self, ping: Option<PingResult>) -> Self {
        if self.provider.is_some() {
            self.ping = ping;
        }
        self
    }

    pub fn provider_id(&self) -> Option<u64> {
        self.provider.map(|facts| facts.id)
    }
}

/// Converts an 18-decimal base-unit amount to display units.
///
/// Precision below the f64 mantissa is lost.
pub fn to_display_units(value: U256) -> f64 {
    format_ether(value).parse().unwrap_or_default()
}

/// Converts an epoch number to a gauge value. Epochs past `u64::MAX` (the
/// "never runs out" sentinel) map to infinity.
pub fn epoch_to_f64(epoch: U256) -> f64 {
    u64::try_from(epoch).map_or(f64::INFINITY, |epoch| epoch as f64)
}
