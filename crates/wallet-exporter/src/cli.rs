//! Command-line configuration for the wallet exporter.

use crate::{
    config::{
        Config,
        ConfigBuilder,
        DEFAULT_RPC_URL,
        Network,
        numbered_wallet_entries,
        parse_duration,
    },
    error::ExporterError,
};
use clap::Parser;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Network name. `calibration` and `mainnet` provide default contract addresses.
    #[arg(long, env = "NETWORK", default_value = "calibration")]
    pub network: Network,

    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    #[arg(long, env = "WARM_STORAGE_ADDRESS")]
    pub warm_storage_address: Option<String>,

    #[arg(long, env = "USDFC_TOKEN_ADDRESS")]
    pub usdfc_token_address: Option<String>,

    #[arg(long, env = "PAYMENTS_ADDRESS")]
    pub payments_address: Option<String>,

    /// Comma separated `address:name[:kind]` entries. `CUSTOM_WALLET_<n>`
    /// variables are appended after these.
    #[arg(long, env = "CUSTOM_WALLETS", value_delimiter = ',')]
    pub custom_wallets: Vec<String>,

    #[arg(long, env = "EXPORTER_PORT", default_value_t = 9091)]
    pub exporter_port: u16,

    #[arg(long, env = "SCRAPE_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    pub scrape_interval: Duration,

    #[arg(long, env = "METRICS_PREFIX", default_value = "dealbot")]
    pub metrics_prefix: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,

    /// Upper bound on in-flight remote calls during a scrape cycle.
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 10)]
    pub max_concurrent_requests: usize,
}

impl Args {
    /// Validates the arguments. `vars` supplies the numbered
    /// `CUSTOM_WALLET_<n>` entries, normally `std::env::vars()`.
    pub fn into_config<I>(self, vars: I) -> Result<Config, ExporterError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut custom_wallets = self.custom_wallets;
        custom_wallets.extend(numbered_wallet_entries(vars));

        ConfigBuilder {
            network: self.network,
            rpc_url: self.rpc_url,
            warm_storage_address: self.warm_storage_address,
            usdfc_token_address: self.usdfc_token_address,
            payments_address: self.payments_address,
            custom_wallets,
            exporter_port: self.exporter_port,
            scrape_interval: self.scrape_interval,
            metrics_prefix: self.metrics_prefix,
            log_level: self.log_level,
            max_concurrent_requests: self.max_concurrent_requests,
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WalletKind;

    const WALLET_A: &str = "0x1111111111111111111111111111111111111111";
    const WALLET_B: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn defaults_match_calibration() {
        let args = Args::try_parse_from(["wallet-exporter"]).unwrap();
        assert_eq!(args.network, Network::Calibration);
        assert_eq!(args.exporter_port, 9091);
        assert_eq!(args.scrape_interval, Duration::from_secs(60));
        assert_eq!(args.metrics_prefix, "dealbot");
        assert_eq!(args.log_level, LevelFilter::INFO);
        assert_eq!(args.max_concurrent_requests, 10);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "wallet-exporter",
            "--network",
            "mainnet",
            "--scrape-interval",
            "2m",
            "--log-level",
            "debug",
            "--custom-wallets",
            &format!("{WALLET_A}:a:client,{WALLET_B}:b"),
        ])
        .unwrap();

        assert_eq!(args.network, Network::Mainnet);
        assert_eq!(args.scrape_interval, Duration::from_secs(120));
        assert_eq!(args.log_level, LevelFilter::DEBUG);
        assert_eq!(args.custom_wallets.len(), 2);
    }

    #[test]
    fn rejects_unparseable_interval() {
        assert!(Args::try_parse_from(["wallet-exporter", "--scrape-interval", "soon"]).is_err());
    }

    #[test]
    fn numbered_wallets_follow_the_list() {
        let args = Args::try_parse_from([
            "wallet-exporter",
            "--custom-wallets",
            &format!("{WALLET_A}:listed:operator"),
        ])
        .unwrap();
        let vars = vec![("CUSTOM_WALLET_1".to_string(), format!("{WALLET_B}:numbered"))];

        let config = args.into_config(vars).unwrap();
        let names: Vec<_> = config.custom_wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["listed", "numbered"]);
        assert_eq!(config.custom_wallets[0].kind, WalletKind::Operator);
        assert_eq!(config.custom_wallets[1].kind, WalletKind::Other);
    }
}
