//! # Configuration
//!
//! Coordinator and per-chain settings. Values are injected by the host
//! (see `swap-node`), never compiled in.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::ChainId;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Timelock policy cannot produce ordered timelocks.
    #[error("Invalid timelock policy: {0}")]
    InvalidTimelocks(String),

    /// An interval or timeout is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// Required chain field is missing.
    #[error("Chain {chain}: missing {field}")]
    MissingField {
        /// Chain being configured
        chain: ChainId,
        /// Missing field name
        field: &'static str,
    },

    /// Field has an unusable value.
    #[error("Chain {chain}: invalid {field}: {reason}")]
    InvalidField {
        /// Chain being configured
        chain: ChainId,
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Same chain configured twice.
    #[error("Chain {0} configured more than once")]
    DuplicateChain(ChainId),

    /// Development-only setting used where production is required.
    #[error("Chain {0} uses the in-process ledger adapter, not allowed in production")]
    LedgerInProduction(ChainId),
}

/// Default timelock durations relative to creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelockPolicy {
    /// Source leg lifetime.
    pub src_secs: u64,
    /// Destination leg lifetime.
    pub dst_secs: u64,
    /// Minimum `src - dst` gap.
    pub min_margin_secs: u64,
}

impl Default for TimelockPolicy {
    fn default() -> Self {
        Self {
            src_secs: 3_600,
            dst_secs: 1_800,
            min_margin_secs: 900,
        }
    }
}

/// Coordinator and monitor settings.
#[derive(Clone, Debug)]
pub struct SwapConfig {
    /// Timelock defaults.
    pub timelocks: TimelockPolicy,
    /// Minimum seconds before `dst_timelock` to start the destination deposit.
    pub deposit_window_secs: u64,
    /// Minimum seconds before `dst_timelock` to reveal the secret.
    pub reveal_window_secs: u64,
    /// Driver poll interval.
    pub poll_interval: Duration,
    /// Expiry monitor scan interval.
    pub monitor_interval: Duration,
    /// Confirmation timeout for chains without their own setting.
    pub confirmation_timeout: Duration,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            timelocks: TimelockPolicy::default(),
            deposit_window_secs: 120,
            reveal_window_secs: 300,
            poll_interval: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(15),
            confirmation_timeout: Duration::from_secs(600),
        }
    }
}

impl SwapConfig {
    /// Settings for tests: short intervals, small windows.
    pub fn for_testing() -> Self {
        Self {
            timelocks: TimelockPolicy::default(),
            deposit_window_secs: 60,
            reveal_window_secs: 120,
            poll_interval: Duration::from_millis(20),
            monitor_interval: Duration::from_millis(50),
            confirmation_timeout: Duration::from_millis(500),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timelocks;
        if t.dst_secs >= t.src_secs {
            return Err(ConfigError::InvalidTimelocks(format!(
                "destination lifetime {}s must be shorter than source lifetime {}s",
                t.dst_secs, t.src_secs
            )));
        }
        if t.src_secs - t.dst_secs < t.min_margin_secs {
            return Err(ConfigError::InvalidTimelocks(format!(
                "gap {}s is below the minimum margin {}s",
                t.src_secs - t.dst_secs,
                t.min_margin_secs
            )));
        }
        if self.deposit_window_secs + self.reveal_window_secs >= t.dst_secs {
            return Err(ConfigError::InvalidTimelocks(
                "deposit and reveal windows leave no time on the destination leg".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll interval"));
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("monitor interval"));
        }
        if self.confirmation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("confirmation timeout"));
        }
        Ok(())
    }
}

/// Which adapter implementation drives a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    /// EVM escrow contract over JSON-RPC.
    Evm,
    /// In-process ledger (development networks and tests).
    Ledger,
}

impl std::str::FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(AdapterKind::Evm),
            "ledger" | "local" => Ok(AdapterKind::Ledger),
            other => Err(format!("unknown adapter kind '{}'", other)),
        }
    }
}

/// Per-chain settings.
#[derive(Clone)]
pub struct ChainConfig {
    /// Chain.
    pub chain: ChainId,
    /// Adapter implementation.
    pub adapter: AdapterKind,
    /// JSON-RPC endpoint.
    pub rpc_url: Option<String>,
    /// Escrow contract / program identifier.
    pub escrow: Option<String>,
    /// Confirmation depth.
    pub confirmations: u64,
    /// How long to wait for a confirmation; the coordinator default when unset.
    pub confirmation_timeout: Option<Duration>,
    /// Resolver address on this chain (claims source legs, funds destination legs).
    pub resolver_address: String,
    /// Signing key for this chain. Never logged.
    pub signer_key: Option<String>,
    /// Numeric chain id for EVM transaction signing.
    pub evm_chain_id: Option<u64>,
}

impl ChainConfig {
    /// Settings with chain defaults and no endpoint.
    pub fn new(chain: ChainId, adapter: AdapterKind, resolver_address: impl Into<String>) -> Self {
        Self {
            chain,
            adapter,
            rpc_url: None,
            escrow: None,
            confirmations: chain.required_confirmations(),
            confirmation_timeout: None,
            resolver_address: resolver_address.into(),
            signer_key: None,
            evm_chain_id: None,
        }
    }

    /// Check the fields the adapter kind needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver_address.trim().is_empty() {
            return Err(ConfigError::MissingField {
                chain: self.chain,
                field: "resolver address",
            });
        }
        if self.confirmation_timeout.map_or(false, |t| t.is_zero()) {
            return Err(ConfigError::ZeroDuration("confirmation timeout"));
        }
        if self.adapter == AdapterKind::Evm {
            if self.rpc_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(ConfigError::MissingField {
                    chain: self.chain,
                    field: "rpc url",
                });
            }
            if self.escrow.as_deref().map_or(true, |e| e.trim().is_empty()) {
                return Err(ConfigError::MissingField {
                    chain: self.chain,
                    field: "escrow address",
                });
            }
            if self.signer_key.is_none() {
                return Err(ConfigError::MissingField {
                    chain: self.chain,
                    field: "signer key",
                });
            }
            if self.confirmations == 0 {
                return Err(ConfigError::InvalidField {
                    chain: self.chain,
                    field: "confirmations",
                    reason: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("chain", &self.chain)
            .field("adapter", &self.adapter)
            .field("rpc_url", &self.rpc_url)
            .field("escrow", &self.escrow)
            .field("confirmations", &self.confirmations)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("resolver_address", &self.resolver_address)
            .field("signer_key", &self.signer_key.as_ref().map(|_| "***"))
            .field("evm_chain_id", &self.evm_chain_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SwapConfig::default().validate().is_ok());
        assert!(SwapConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_inverted_policy_rejected() {
        let mut config = SwapConfig::default();
        config.timelocks.dst_secs = 4_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimelocks(_))
        ));
    }

    #[test]
    fn test_margin_enforced() {
        let mut config = SwapConfig::default();
        config.timelocks.min_margin_secs = 2_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_evm_chain_requires_endpoint() {
        let config = ChainConfig::new(ChainId::Ethereum, AdapterKind::Evm, "0xresolver");
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingField {
                chain: ChainId::Ethereum,
                field: "rpc url"
            })
        );
    }

    #[test]
    fn test_ledger_chain_needs_only_resolver() {
        let config = ChainConfig::new(ChainId::Near, AdapterKind::Ledger, "resolver.near");
        assert!(config.validate().is_ok());
        assert_eq!(config.confirmations, 3);
    }

    #[test]
    fn test_debug_redacts_signer_key() {
        let mut config = ChainConfig::new(ChainId::Polygon, AdapterKind::Evm, "0xr");
        config.signer_key = Some("deadbeef".into());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("deadbeef"));
    }

    #[test]
    fn test_adapter_kind_parse() {
        assert_eq!("EVM".parse::<AdapterKind>(), Ok(AdapterKind::Evm));
        assert_eq!("local".parse::<AdapterKind>(), Ok(AdapterKind::Ledger));
        assert!("cosmos".parse::<AdapterKind>().is_err());
    }
}
