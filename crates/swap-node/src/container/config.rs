//! # Node Configuration
//!
//! Everything the node needs, read from `SWAP_*` environment variables.
//!
//! ## Security Requirements
//!
//! - Signing keys come from the environment only and are never logged
//! - The in-process ledger adapter is rejected by `validate_for_production`

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use swap_core::{AdapterKind, Amount, ChainConfig, ChainId, ConfigError, SwapConfig};

/// Node configuration errors.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    /// A required variable is not set.
    #[error("Missing environment variable {0}")]
    Missing(String),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: String,
        /// Parse failure
        reason: String,
    },

    /// Fewer than two chains configured.
    #[error("At least two chains are required, {0} configured")]
    TooFewChains(usize),

    /// Swap or chain settings are inconsistent.
    #[error(transparent)]
    Swap(#[from] ConfigError),
}

/// Order store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Single file, rewritten atomically on each commit.
    File,
    /// RocksDB (requires the `rocksdb` feature).
    RocksDb,
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding the store and the `LOCK` file.
    pub data_dir: PathBuf,
    /// Order store backend.
    pub storage: StorageBackend,
    /// Coordinator and monitor settings.
    pub swap: SwapConfig,
    /// One entry per chain.
    pub chains: Vec<ChainConfig>,
    /// Initial balances for ledger-backed chains: `(chain, account, amount)`.
    pub ledger_funding: Vec<(ChainId, String, Amount)>,
    /// Where to write the Prometheus text snapshot.
    pub metrics_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: StorageBackend::File,
            swap: SwapConfig::default(),
            chains: Vec::new(),
            ledger_funding: Vec::new(),
            metrics_file: None,
        }
    }
}

impl NodeConfig {
    /// Read configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SWAP_DATA_DIR`: data directory (default: ./data)
    /// - `SWAP_STORAGE`: `file` or `rocksdb` (default: file)
    /// - `SWAP_CHAINS`: comma-separated chain names (required)
    /// - `SWAP_CHAIN_<NAME>_ADAPTER`: `evm` or `ledger` (default: ledger)
    /// - `SWAP_CHAIN_<NAME>_RPC_URL`, `SWAP_CHAIN_<NAME>_ESCROW`
    /// - `SWAP_CHAIN_<NAME>_CONFIRMATIONS`, `SWAP_CHAIN_<NAME>_CONFIRMATION_TIMEOUT_SECS`
    /// - `SWAP_CHAIN_<NAME>_RESOLVER_ADDRESS` (required)
    /// - `SWAP_CHAIN_<NAME>_SIGNER_KEY`, `SWAP_CHAIN_<NAME>_EVM_CHAIN_ID`
    /// - `SWAP_CHAIN_<NAME>_FUND`: ledger balances, `account=amount;...`
    /// - `SWAP_SRC_TIMELOCK_SECS`, `SWAP_DST_TIMELOCK_SECS`, `SWAP_TIMELOCK_MARGIN_SECS`
    /// - `SWAP_DEPOSIT_WINDOW_SECS`, `SWAP_REVEAL_WINDOW_SECS`
    /// - `SWAP_POLL_INTERVAL_SECS`, `SWAP_MONITOR_INTERVAL_SECS`
    /// - `SWAP_CONFIRMATION_TIMEOUT_SECS`
    /// - `SWAP_METRICS_FILE`: Prometheus textfile path
    pub fn from_env() -> Result<Self, NodeConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read configuration through a variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let mut config = NodeConfig::default();

        if let Some(dir) = vars.get("SWAP_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(storage) = vars.get("SWAP_STORAGE") {
            config.storage = match storage.to_ascii_lowercase().as_str() {
                "file" => StorageBackend::File,
                "rocksdb" => StorageBackend::RocksDb,
                other => {
                    return Err(NodeConfigError::Invalid {
                        var: "SWAP_STORAGE".into(),
                        reason: format!("unknown backend '{}'", other),
                    })
                }
            };
        }
        config.metrics_file = vars.get("SWAP_METRICS_FILE").map(PathBuf::from);

        let swap = &mut config.swap;
        vars.parse_into("SWAP_SRC_TIMELOCK_SECS", &mut swap.timelocks.src_secs)?;
        vars.parse_into("SWAP_DST_TIMELOCK_SECS", &mut swap.timelocks.dst_secs)?;
        vars.parse_into("SWAP_TIMELOCK_MARGIN_SECS", &mut swap.timelocks.min_margin_secs)?;
        vars.parse_into("SWAP_DEPOSIT_WINDOW_SECS", &mut swap.deposit_window_secs)?;
        vars.parse_into("SWAP_REVEAL_WINDOW_SECS", &mut swap.reveal_window_secs)?;
        if let Some(secs) = vars.parse::<u64>("SWAP_POLL_INTERVAL_SECS")? {
            swap.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse::<u64>("SWAP_MONITOR_INTERVAL_SECS")? {
            swap.monitor_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse::<u64>("SWAP_CONFIRMATION_TIMEOUT_SECS")? {
            swap.confirmation_timeout = Duration::from_secs(secs);
        }

        let names = vars
            .get("SWAP_CHAINS")
            .ok_or_else(|| NodeConfigError::Missing("SWAP_CHAINS".into()))?;
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let chain: ChainId = name.parse().map_err(|reason| NodeConfigError::Invalid {
                var: "SWAP_CHAINS".into(),
                reason,
            })?;
            let (chain_config, funding) = vars.chain(chain)?;
            config.chains.push(chain_config);
            config
                .ledger_funding
                .extend(funding.into_iter().map(|(account, amount)| (chain, account, amount)));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check consistency. Does not require production settings.
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        self.swap.validate()?;
        if self.chains.len() < 2 {
            return Err(NodeConfigError::TooFewChains(self.chains.len()));
        }
        let mut seen = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.chain) {
                return Err(ConfigError::DuplicateChain(chain.chain).into());
            }
        }
        Ok(())
    }

    /// Validate configuration for production readiness.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - any chain uses the in-process ledger adapter
    /// - an EVM chain lacks its endpoint, escrow or signer key
    pub fn validate_for_production(&self) -> Result<(), NodeConfigError> {
        self.validate()?;
        for chain in &self.chains {
            if chain.adapter == AdapterKind::Ledger {
                return Err(ConfigError::LedgerInProduction(chain.chain).into());
            }
        }
        Ok(())
    }

    /// Path of the order store file or directory.
    pub fn store_path(&self) -> PathBuf {
        match self.storage {
            StorageBackend::File => self.data_dir.join("orders.db"),
            StorageBackend::RocksDb => self.data_dir.join("rocksdb"),
        }
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, NodeConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim().parse().map_err(|e: T::Err| NodeConfigError::Invalid {
                    var: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse_into<T>(&self, name: &str, target: &mut T) -> Result<(), NodeConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = self.parse(name)? {
            *target = value;
        }
        Ok(())
    }

    fn chain(&self, chain: ChainId) -> Result<(ChainConfig, Vec<(String, Amount)>), NodeConfigError> {
        let prefix = format!("SWAP_CHAIN_{}_", chain.name().to_ascii_uppercase());
        let var = |field: &str| format!("{}{}", prefix, field);

        let adapter = match self.get(&var("ADAPTER")) {
            Some(raw) => raw.parse::<AdapterKind>().map_err(|reason| NodeConfigError::Invalid {
                var: var("ADAPTER"),
                reason,
            })?,
            None => AdapterKind::Ledger,
        };
        let resolver = self
            .get(&var("RESOLVER_ADDRESS"))
            .ok_or_else(|| NodeConfigError::Missing(var("RESOLVER_ADDRESS")))?;

        let mut config = ChainConfig::new(chain, adapter, resolver);
        config.rpc_url = self.get(&var("RPC_URL"));
        config.escrow = self.get(&var("ESCROW"));
        config.signer_key = self.get(&var("SIGNER_KEY"));
        config.evm_chain_id = self.parse(&var("EVM_CHAIN_ID"))?;
        self.parse_into(&var("CONFIRMATIONS"), &mut config.confirmations)?;
        config.confirmation_timeout = self
            .parse::<u64>(&var("CONFIRMATION_TIMEOUT_SECS"))?
            .map(Duration::from_secs);

        let funding = match self.get(&var("FUND")) {
            Some(raw) => parse_funding(&raw).map_err(|reason| NodeConfigError::Invalid {
                var: var("FUND"),
                reason,
            })?,
            None => Vec::new(),
        };
        Ok((config, funding))
    }
}

fn parse_funding(raw: &str) -> Result<Vec<(String, Amount)>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (account, amount) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected account=amount, got '{}'", entry))?;
            let amount = Amount::from_dec_str(amount.trim())
                .map_err(|e| format!("bad amount '{}': {:?}", amount, e))?;
            Ok((account.trim().to_string(), amount))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn dev_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SWAP_CHAINS", "ethereum, near"),
            ("SWAP_CHAIN_ETHEREUM_RESOLVER_ADDRESS", "0xresolver"),
            ("SWAP_CHAIN_ETHEREUM_FUND", "0xresolver=1000; 0xuser=50"),
            ("SWAP_CHAIN_NEAR_RESOLVER_ADDRESS", "resolver.near"),
            ("SWAP_CHAIN_NEAR_CONFIRMATION_TIMEOUT_SECS", "30"),
        ]
    }

    #[test]
    fn test_from_vars_dev_ledger() {
        let config = NodeConfig::from_vars(vars(&dev_pairs())).unwrap();
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].chain, ChainId::Ethereum);
        assert_eq!(config.chains[0].adapter, AdapterKind::Ledger);
        assert_eq!(config.chains[1].confirmation_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.ledger_funding.len(), 2);
        assert_eq!(config.ledger_funding[1].2, Amount::from(50u64));
        assert_eq!(config.store_path(), PathBuf::from("./data/orders.db"));
    }

    #[test]
    fn test_missing_chains() {
        let err = NodeConfig::from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, NodeConfigError::Missing(v) if v == "SWAP_CHAINS"));
    }

    #[test]
    fn test_single_chain_rejected() {
        let err = NodeConfig::from_vars(vars(&[
            ("SWAP_CHAINS", "near"),
            ("SWAP_CHAIN_NEAR_RESOLVER_ADDRESS", "r.near"),
        ]))
        .unwrap_err();
        assert!(matches!(err, NodeConfigError::TooFewChains(1)));
    }

    #[test]
    fn test_bad_number() {
        let mut pairs = dev_pairs();
        pairs.push(("SWAP_POLL_INTERVAL_SECS", "soon"));
        let err = NodeConfig::from_vars(vars(&pairs)).unwrap_err();
        assert!(matches!(err, NodeConfigError::Invalid { var, .. } if var == "SWAP_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_production_rejects_ledger() {
        let config = NodeConfig::from_vars(vars(&dev_pairs())).unwrap();
        assert!(matches!(
            config.validate_for_production(),
            Err(NodeConfigError::Swap(ConfigError::LedgerInProduction(ChainId::Ethereum)))
        ));
    }

    #[test]
    fn test_evm_requires_endpoint_and_key() {
        let mut pairs = dev_pairs();
        pairs.push(("SWAP_CHAIN_ETHEREUM_ADAPTER", "evm"));
        let err = NodeConfig::from_vars(vars(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            NodeConfigError::Swap(ConfigError::MissingField { field: "rpc url", .. })
        ));
    }

    #[test]
    fn test_parse_funding() {
        let parsed = parse_funding("a=1;b = 20 ;").unwrap();
        assert_eq!(parsed, vec![("a".into(), Amount::from(1u64)), ("b".into(), Amount::from(20u64))]);
        assert!(parse_funding("nope").is_err());
    }
}
