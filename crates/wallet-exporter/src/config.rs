//! Validated runtime configuration.
//!
//! [`Args`](crate::cli::Args) holds the raw flags and environment values;
//! [`Config`] is what the exporter runs with once everything has been parsed
//! and checked. It is immutable for the lifetime of the process.

use crate::{
    error::ExporterError,
    model::WalletKind,
};
use alloy::primitives::Address;
use std::{
    collections::{
        BTreeMap,
        HashSet,
    },
    fmt,
    net::{
        Ipv4Addr,
        SocketAddr,
    },
    str::FromStr,
    time::Duration,
};
use tracing::level_filters::LevelFilter;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "https://api.calibration.node.glif.io/rpc/v1";

/// Highest `CUSTOM_WALLET_<n>` index that is read.
pub const MAX_NUMBERED_WALLETS: u32 = 1000;

const NUMBERED_WALLET_PREFIX: &str = "CUSTOM_WALLET_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Calibration,
    Mainnet,
    /// Any other network. Contract addresses must be configured explicitly.
    Custom(String),
}

/// Contract addresses of the storage service deployment on a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkContracts {
    pub warm_storage: &'static str,
    pub usdfc_token: &'static str,
    pub payments: &'static str,
}

impl Network {
    pub fn contracts(&self) -> Option<NetworkContracts> {
        match self {
            Self::Calibration => Some(NetworkContracts {
                warm_storage: "0x02925630df557F957f70E112bA06e50965417CA0",
                usdfc_token: "0xb3042734b608a1B16e9e86B374A3f3e389B4cDf0",
                payments: "0x09a0fDc2723fAd1A7b8e3e00eE5DF73841df55a0",
            }),
            Self::Mainnet => Some(NetworkContracts {
                warm_storage: "0x8408502033C418E1bbC97cE9ac48E5528F371A9f",
                usdfc_token: "0x80B98d3aa09ffff255c3ba4A241111Ff1262F045",
                payments: "0x23b1e018F08BB982348b15a86ee926eEBf7F4DAa",
            }),
            Self::Custom(_) => None,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Network must not be empty".to_string());
        }
        match s.to_lowercase().as_str() {
            "calibration" => Ok(Self::Calibration),
            "mainnet" => Ok(Self::Mainnet),
            _ => Ok(Self::Custom(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calibration => f.write_str("calibration"),
            Self::Mainnet => f.write_str("mainnet"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A statically configured wallet that is not part of the provider registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomWallet {
    pub address: Address,
    pub name: String,
    pub kind: WalletKind,
}

impl FromStr for CustomWallet {
    type Err = String;

    /// Parses `address:name` or `address:name:kind`.
    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = entry.trim().split(':').map(str::trim).collect();
        let (address, name, kind) = match parts.as_slice() {
            [address, name] => (*address, *name, None),
            [address, name, kind] => (*address, *name, Some(*kind)),
            _ => {
                return Err(format!(
                    "invalid custom wallet {entry:?}, expected address:name[:kind]"
                ));
            }
        };

        let address = Address::from_str(address)
            .map_err(|e| format!("invalid custom wallet address {address:?}: {e}"))?;
        let kind = match kind {
            Some(kind) if !kind.is_empty() => kind.parse()?,
            _ => WalletKind::Other,
        };

        Ok(Self {
            address,
            name: name.to_string(),
            kind,
        })
    }
}

/// Values of `CUSTOM_WALLET_1` .. `CUSTOM_WALLET_1000`, ordered by index.
pub fn numbered_wallet_entries<I>(vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let entries: BTreeMap<u32, String> = vars
        .into_iter()
        .filter_map(|(key, value)| {
            let index: u32 = key.strip_prefix(NUMBERED_WALLET_PREFIX)?.parse().ok()?;
            let in_range = (1..=MAX_NUMBERED_WALLETS).contains(&index);
            (in_range && !value.trim().is_empty()).then_some((index, value))
        })
        .collect();

    entries.into_values().collect()
}

/// Parses durations such as `60s`, `500ms`, `5m` or `1h30m`. A bare number is
/// read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let input = s.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let invalid = || format!("invalid duration {input:?}");
    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = tail;

        total += Duration::try_from_secs_f64(value * scale).map_err(|_| invalid())?;
    }

    Ok(total)
}

fn is_valid_metric_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub rpc_url: Url,
    pub warm_storage_address: Address,
    pub usdfc_token_address: Address,
    pub payments_address: Address,
    pub custom_wallets: Vec<CustomWallet>,
    pub exporter_port: u16,
    pub scrape_interval: Duration,
    pub metrics_prefix: String,
    pub log_level: LevelFilter,
    pub max_concurrent_requests: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.exporter_port))
    }
}

/// Raw values collected from flags and environment, validated into a
/// [`Config`] by [`ConfigBuilder::build`].
#[derive(Debug, Clone)]
pub(crate) struct ConfigBuilder {
    pub network: Network,
    pub rpc_url: String,
    pub warm_storage_address: Option<String>,
    pub usdfc_token_address: Option<String>,
    pub payments_address: Option<String>,
    pub custom_wallets: Vec<String>,
    pub exporter_port: u16,
    pub scrape_interval: Duration,
    pub metrics_prefix: String,
    pub log_level: LevelFilter,
    pub max_concurrent_requests: usize,
}

impl ConfigBuilder {
    pub(crate) fn build(self) -> Result<Config, ExporterError> {
        let invalid = |msg: String| ExporterError::InvalidConfig(msg);

        let rpc_url = self.rpc_url.trim();
        if rpc_url.is_empty() {
            return Err(invalid("RPC_URL is required".to_string()));
        }
        let rpc_url =
            Url::parse(rpc_url).map_err(|e| invalid(format!("RPC_URL {rpc_url:?} is invalid: {e}")))?;

        let defaults = self.network.contracts();
        let resolve = |name: &str, value: Option<String>, default: Option<&str>| {
            let value = value
                .filter(|v| !v.trim().is_empty())
                .or_else(|| default.map(str::to_string))
                .ok_or_else(|| {
                    invalid(format!(
                        "{name} is required for network {}",
                        self.network
                    ))
                })?;
            Address::from_str(value.trim())
                .map_err(|e| invalid(format!("{name} {value:?} is not a valid address: {e}")))
        };
        let warm_storage_address = resolve(
            "WARM_STORAGE_ADDRESS",
            self.warm_storage_address.clone(),
            defaults.map(|d| d.warm_storage),
        )?;
        let usdfc_token_address = resolve(
            "USDFC_TOKEN_ADDRESS",
            self.usdfc_token_address.clone(),
            defaults.map(|d| d.usdfc_token),
        )?;
        let payments_address = resolve(
            "PAYMENTS_ADDRESS",
            self.payments_address.clone(),
            defaults.map(|d| d.payments),
        )?;

        if self.exporter_port == 0 {
            return Err(invalid(
                "EXPORTER_PORT must be between 1 and 65535".to_string(),
            ));
        }
        if self.scrape_interval.is_zero() {
            return Err(invalid("SCRAPE_INTERVAL must be greater than zero".to_string()));
        }
        if !is_valid_metric_prefix(&self.metrics_prefix) {
            return Err(invalid(format!(
                "METRICS_PREFIX {:?} is not a valid metric name prefix",
                self.metrics_prefix
            )));
        }
        if !(1..=1000).contains(&self.max_concurrent_requests) {
            return Err(invalid(
                "MAX_CONCURRENT_REQUESTS must be between 1 and 1000".to_string(),
            ));
        }

        let custom_wallets = self
            .custom_wallets
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| entry.parse::<CustomWallet>().map_err(invalid))
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = HashSet::new();
        if let Some(dup) = custom_wallets.iter().find(|w| !seen.insert(w.address)) {
            return Err(invalid(format!(
                "custom wallet {} is configured more than once",
                dup.address
            )));
        }

        Ok(Config {
            network: self.network,
            rpc_url,
            warm_storage_address,
            usdfc_token_address,
            payments_address,
            custom_wallets,
            exporter_port: self.exporter_port,
            scrape_interval: self.scrape_interval,
            metrics_prefix: self.metrics_prefix,
            log_level: self.log_level,
            max_concurrent_requests: self.max_concurrent_requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn builder() -> ConfigBuilder {
        ConfigBuilder {
            network: Network::Calibration,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            warm_storage_address: None,
            usdfc_token_address: None,
            payments_address: None,
            custom_wallets: Vec::new(),
            exporter_port: 9091,
            scrape_interval: Duration::from_secs(60),
            metrics_prefix: "dealbot".to_string(),
            log_level: LevelFilter::INFO,
            max_concurrent_requests: 10,
        }
    }

    #[test]
    fn network_defaults_fill_missing_addresses() {
        let config = builder().build().unwrap();
        assert_eq!(
            config.usdfc_token_address,
            address!("0xb3042734b608a1B16e9e86B374A3f3e389B4cDf0")
        );

        let config = ConfigBuilder {
            network: Network::Mainnet,
            ..builder()
        }
        .build()
        .unwrap();
        assert_eq!(
            config.usdfc_token_address,
            address!("0x80B98d3aa09ffff255c3ba4A241111Ff1262F045")
        );
        assert_eq!(
            config.warm_storage_address,
            address!("0x8408502033C418E1bbC97cE9ac48E5528F371A9f")
        );
    }

    #[test]
    fn explicit_address_overrides_default() {
        let config = ConfigBuilder {
            warm_storage_address: Some("0x1234567890123456789012345678901234567890".into()),
            ..builder()
        }
        .build()
        .unwrap();
        assert_eq!(
            config.warm_storage_address,
            address!("0x1234567890123456789012345678901234567890")
        );
    }

    #[test]
    fn custom_network_requires_addresses() {
        let err = ConfigBuilder {
            network: "devnet".parse().unwrap(),
            ..builder()
        }
        .build()
        .unwrap_err();
        assert!(err.to_string().contains("WARM_STORAGE_ADDRESS is required"));
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ConfigBuilder {
                rpc_url: String::new(),
                ..builder()
            },
            ConfigBuilder {
                rpc_url: "not a url".into(),
                ..builder()
            },
            ConfigBuilder {
                warm_storage_address: Some("0x1234".into()),
                ..builder()
            },
            ConfigBuilder {
                exporter_port: 0,
                ..builder()
            },
            ConfigBuilder {
                scrape_interval: Duration::ZERO,
                ..builder()
            },
            ConfigBuilder {
                metrics_prefix: "9lives".into(),
                ..builder()
            },
            ConfigBuilder {
                max_concurrent_requests: 0,
                ..builder()
            },
            ConfigBuilder {
                max_concurrent_requests: 1001,
                ..builder()
            },
            ConfigBuilder {
                custom_wallets: vec!["invalid".into()],
                ..builder()
            },
            ConfigBuilder {
                custom_wallets: vec![
                    "0x1234567890123456789012345678901234567890:sp:provider".into(),
                ],
                ..builder()
            },
        ];

        for case in cases {
            let debug = format!("{case:?}");
            assert!(
                matches!(case.build(), Err(ExporterError::InvalidConfig(_))),
                "expected validation error for {debug}"
            );
        }
    }

    #[test]
    fn duplicate_wallet_addresses_are_rejected() {
        let err = ConfigBuilder {
            custom_wallets: vec![
                "0x1234567890123456789012345678901234567890:first:client".into(),
                "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd:ops".into(),
                "0x1234567890123456789012345678901234567890:again".into(),
            ],
            ..builder()
        }
        .build()
        .unwrap_err();
        assert!(err.to_string().contains("configured more than once"));
    }

    #[test]
    fn custom_wallet_entries() {
        let wallet: CustomWallet = "0x1234567890123456789012345678901234567890:Client A:client"
            .parse()
            .unwrap();
        assert_eq!(wallet.name, "Client A");
        assert_eq!(wallet.kind, WalletKind::Client);

        let wallet: CustomWallet = " 0x1234567890123456789012345678901234567890 : Ops "
            .parse()
            .unwrap();
        assert_eq!(wallet.name, "Ops");
        assert_eq!(wallet.kind, WalletKind::Other);

        assert!("0x1234567890123456789012345678901234567890".parse::<CustomWallet>().is_err());
        assert!("nothex:name".parse::<CustomWallet>().is_err());
    }

    #[test]
    fn numbered_wallets_are_ordered_by_index() {
        let vars = vec![
            ("CUSTOM_WALLET_10".to_string(), "c".to_string()),
            ("CUSTOM_WALLET_2".to_string(), "b".to_string()),
            ("CUSTOM_WALLET_1".to_string(), "a".to_string()),
            ("CUSTOM_WALLET_3".to_string(), "  ".to_string()),
            ("CUSTOM_WALLET_1001".to_string(), "too far".to_string()),
            ("CUSTOM_WALLET_X".to_string(), "bad".to_string()),
            ("CUSTOM_WALLETS".to_string(), "legacy".to_string()),
        ];
        assert_eq!(numbered_wallet_entries(vars), vec!["a", "b", "c"]);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("60s"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5m"), Ok(Duration::from_secs(90)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn metric_prefix_rules() {
        assert!(is_valid_metric_prefix("dealbot"));
        assert!(is_valid_metric_prefix("_x:y_1"));
        assert!(!is_valid_metric_prefix(""));
        assert!(!is_valid_metric_prefix("has-dash"));
    }

    #[test]
    fn listens_on_all_interfaces() {
        let config = builder().build().unwrap();
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:9091");
    }
}
