use ethers::types::Address;
use std::net::SocketAddr;
use url::Url;

/// Address the `CompanyShares` contract gets on a fresh local development chain.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

pub const MAX_CONFIRMATIONS: usize = 12;

/// Runtime configuration for the market client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketConfig {
    pub rpc_url: Url,
    pub contract_address: Address,
    pub chain_id: u64,
    pub confirmations: usize, // Blocks to wait before a transaction counts as settled
    pub bind_addr: SocketAddr,

    // Simulation mode runs against the in-memory ledger instead of a chain
    pub simulate: bool,
    pub initial_supply: u64,
    pub simulated_funds: u64, // Display units credited to the simulated account
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            rpc_url: Url::parse("ws://127.0.0.1:8545").expect("static URL is valid"),
            contract_address: Address::from([
                0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f,
                0x64, 0x2f, 0x64, 0x18, 0x0a, 0xa3,
            ]),
            chain_id: 31337,
            confirmations: 1,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            simulate: false,
            initial_supply: 1000,
            simulated_funds: 100,
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MarketConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from `lookup`, keeping the default for every
    /// variable that is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> MarketConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = MarketConfig::default();

        if let Some(raw) = lookup("MARKET_RPC_URL") {
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => config.rpc_url = url,
                Ok(url) => {
                    tracing::warn!(
                        "Invalid MARKET_RPC_URL scheme '{}' (expected ws or wss), using default: {}",
                        url.scheme(),
                        config.rpc_url
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MARKET_RPC_URL '{}': {}, using default: {}",
                        raw,
                        e,
                        config.rpc_url
                    );
                }
            }
        }

        if let Some(raw) = lookup("MARKET_CONTRACT_ADDRESS") {
            match raw.parse::<Address>() {
                Ok(address) => config.contract_address = address,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MARKET_CONTRACT_ADDRESS '{}': {}, using default: {:?}",
                        raw,
                        e,
                        config.contract_address
                    );
                }
            }
        }

        if let Some(raw) = lookup("MARKET_CHAIN_ID") {
            match raw.parse::<u64>() {
                Ok(value) if value > 0 => config.chain_id = value,
                _ => {
                    tracing::warn!(
                        "Invalid MARKET_CHAIN_ID '{}', using default: {}",
                        raw,
                        config.chain_id
                    );
                }
            }
        }

        if let Some(raw) = lookup("MARKET_CONFIRMATIONS") {
            match raw.parse::<usize>() {
                Ok(value) if (1..=MAX_CONFIRMATIONS).contains(&value) => {
                    config.confirmations = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "Invalid MARKET_CONFIRMATIONS value: {} (must be between 1 and {}), using default: {}",
                        value,
                        MAX_CONFIRMATIONS,
                        config.confirmations
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MARKET_CONFIRMATIONS '{}': {}, using default: {}",
                        raw,
                        e,
                        config.confirmations
                    );
                }
            }
        }

        if let Some(raw) = lookup("MARKET_BIND_ADDR") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MARKET_BIND_ADDR '{}': {}, using default: {}",
                        raw,
                        e,
                        config.bind_addr
                    );
                }
            }
        }

        if let Some(raw) = lookup("MARKET_SIMULATE") {
            config.simulate = raw.to_lowercase() == "true" || raw == "1";
        }

        if let Some(raw) = lookup("MARKET_INITIAL_SUPPLY") {
            if let Ok(value) = raw.parse::<u64>() {
                config.initial_supply = value;
            }
        }

        if let Some(raw) = lookup("MARKET_SIMULATED_FUNDS") {
            if let Ok(value) = raw.parse::<u64>() {
                config.simulated_funds = value;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> MarketConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MarketConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_target_local_chain() {
        let config = config_from(&[]);
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.confirmations, 1);
        assert!(!config.simulate);
        assert_eq!(
            format!("{:?}", config.contract_address),
            DEFAULT_CONTRACT_ADDRESS.to_lowercase()
        );
    }

    #[test]
    fn test_valid_overrides() {
        let config = config_from(&[
            ("MARKET_RPC_URL", "wss://node.example.org/ws"),
            ("MARKET_CHAIN_ID", "11155111"),
            ("MARKET_CONFIRMATIONS", "3"),
            ("MARKET_BIND_ADDR", "0.0.0.0:8080"),
            ("MARKET_SIMULATE", "TRUE"),
            ("MARKET_INITIAL_SUPPLY", "50"),
        ]);
        assert_eq!(config.rpc_url.as_str(), "wss://node.example.org/ws");
        assert_eq!(config.chain_id, 11155111);
        assert_eq!(config.confirmations, 3);
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.simulate);
        assert_eq!(config.initial_supply, 50);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("MARKET_RPC_URL", "http://127.0.0.1:8545"),
            ("MARKET_CONTRACT_ADDRESS", "0x1234"),
            ("MARKET_CHAIN_ID", "0"),
            ("MARKET_CONFIRMATIONS", "13"),
            ("MARKET_BIND_ADDR", "localhost"),
        ]);
        assert_eq!(config, MarketConfig::default());
    }

    #[test]
    fn test_simulate_flag_accepts_one() {
        assert!(config_from(&[("MARKET_SIMULATE", "1")]).simulate);
        assert!(!config_from(&[("MARKET_SIMULATE", "yes")]).simulate);
    }
}
