//! # EVM Escrow Adapter
//!
//! [`ChainAdapter`] for EVM chains running the HTLC escrow contract. The
//! deposit id is the hashlock itself, so every deposit reference is derived
//! without a chain call.
//!
//! Contract state is checked before each write so that rejections come back
//! as typed errors (`AlreadyClaimed`, `Expired`, ...) instead of opaque
//! reverts. The escrow must verify `sha256(secret) == depositId`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, Bytes, H256, U256 as EvmU256};
use tracing::{debug, info};

use super::encoding::{deposit_ref_for, normalize_hashlock, HashlockEncoding};
use crate::config::ChainConfig;
use crate::domain::{
    AdapterError, Amount, ChainId, DepositInfo, DepositRef, DepositState, Hashlock, SecureSecret,
    TxRef,
};
use crate::ports::outbound::ChainAdapter;

abigen!(
    HtlcEscrow,
    r#"[
        function deposit(address claimer, uint256 expirationTime, bytes32 hashlock) external payable
        function claim(bytes32 depositId, bytes secret) external
        function cancelDeposit(bytes32 depositId) external
        function getDeposit(bytes32 depositId) external view returns (address depositor, address claimer, uint256 amount, uint256 expirationTime, bytes32 hashlock, bool claimed, bool cancelled)
        function isExpired(bytes32 depositId) external view returns (bool)
        event DepositCreated(bytes32 indexed depositId, address indexed depositor, address indexed claimer, uint256 amount, uint256 expirationTime, bytes32 hashlock)
        event DepositClaimed(bytes32 indexed depositId, address indexed claimer, bytes secret)
    ]"#
);

type EvmClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Default EIP-155 chain id for each EVM network.
pub fn default_evm_chain_id(chain: ChainId) -> Option<u64> {
    match chain {
        ChainId::Ethereum => Some(1),
        ChainId::Polygon => Some(137),
        ChainId::Arbitrum => Some(42_161),
        _ => None,
    }
}

fn to_evm(amount: Amount) -> EvmU256 {
    let mut buf = [0u8; 32];
    amount.to_big_endian(&mut buf);
    EvmU256::from_big_endian(&buf)
}

fn from_evm(amount: EvmU256) -> Amount {
    let mut buf = [0u8; 32];
    amount.to_big_endian(&mut buf);
    Amount::from_big_endian(&buf)
}

fn address_string(address: Address) -> String {
    format!("{:?}", address)
}

/// Map a provider or contract error onto the adapter taxonomy.
fn classify(message: String) -> AdapterError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        AdapterError::RateLimited(message)
    } else if lower.contains("already claimed") {
        AdapterError::AlreadyClaimed
    } else if lower.contains("already cancelled") {
        AdapterError::AlreadyRefunded
    } else if lower.contains("invalid secret") {
        AdapterError::InvalidSecret
    } else if lower.contains("deposit expired") {
        AdapterError::Expired
    } else if lower.contains("insufficient funds") {
        AdapterError::InsufficientBalance {
            needed: "unknown".into(),
            available: "unknown".into(),
        }
    } else if lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("502")
        || lower.contains("503")
    {
        AdapterError::Unavailable(message)
    } else {
        AdapterError::Rejected(message)
    }
}

fn err<E: std::fmt::Display>(e: E) -> AdapterError {
    classify(e.to_string())
}

/// Escrow contract client for one EVM chain.
pub struct EvmHtlcAdapter {
    chain: ChainId,
    client: Arc<EvmClient>,
    contract: HtlcEscrow<EvmClient>,
    confirmations: u64,
    poll_interval: Duration,
}

impl EvmHtlcAdapter {
    /// Connect using a chain's configuration.
    pub fn from_config(config: &ChainConfig) -> Result<Self, AdapterError> {
        let rpc_url = config
            .rpc_url
            .as_deref()
            .ok_or_else(|| AdapterError::Misconfigured(format!("{}: rpc url missing", config.chain)))?;
        let escrow: Address = config
            .escrow
            .as_deref()
            .ok_or_else(|| AdapterError::Misconfigured(format!("{}: escrow missing", config.chain)))?
            .parse()
            .map_err(|e| AdapterError::Misconfigured(format!("{}: bad escrow address: {}", config.chain, e)))?;
        let key = config
            .signer_key
            .as_deref()
            .ok_or_else(|| AdapterError::Misconfigured(format!("{}: signer key missing", config.chain)))?;
        let chain_id = config
            .evm_chain_id
            .or_else(|| default_evm_chain_id(config.chain))
            .ok_or_else(|| AdapterError::Misconfigured(format!("{} is not an EVM chain", config.chain)))?;

        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| AdapterError::Misconfigured(format!("{}: bad rpc url: {}", config.chain, e)))?;
        // The key itself must never reach a log line or error message.
        let wallet = key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|_| AdapterError::Misconfigured(format!("{}: invalid signer key", config.chain)))?
            .with_chain_id(chain_id);

        info!(
            "[swap] {} escrow {:?} as {:?} (chain id {}, {} confirmations)",
            config.chain,
            escrow,
            wallet.address(),
            chain_id,
            config.confirmations
        );

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = HtlcEscrow::new(escrow, client.clone());
        Ok(Self {
            chain: config.chain,
            client,
            contract,
            confirmations: config.confirmations.max(1),
            poll_interval: Duration::from_secs(config.chain.block_time_secs().clamp(1, 15)),
        })
    }

    fn deposit_id(deposit: &DepositRef) -> Result<[u8; 32], AdapterError> {
        normalize_hashlock(deposit.0.as_bytes(), HashlockEncoding::PrefixedHex).map(|h| *h.as_bytes())
    }

    async fn block_timestamp(&self) -> Result<u64, AdapterError> {
        let block = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(err)?
            .ok_or_else(|| AdapterError::Unavailable("latest block unavailable".into()))?;
        Ok(block.timestamp.low_u64())
    }

    async fn fetch(&self, id: [u8; 32]) -> Result<Option<RawDeposit>, AdapterError> {
        let (depositor, claimer, amount, expiry, hashlock, claimed, cancelled) =
            self.contract.get_deposit(id).call().await.map_err(err)?;
        if depositor == Address::zero() {
            return Ok(None);
        }
        Ok(Some(RawDeposit {
            depositor,
            claimer,
            amount: from_evm(amount),
            expiry: expiry.low_u64(),
            hashlock: normalize_hashlock(&hashlock, HashlockEncoding::Raw)?,
            claimed,
            cancelled,
        }))
    }

    async fn deposit_tx(&self, id: [u8; 32]) -> Result<Option<TxRef>, AdapterError> {
        let logs = self
            .contract
            .deposit_created_filter()
            .topic1(H256::from(id))
            .from_block(0u64)
            .query_with_meta()
            .await
            .map_err(err)?;
        Ok(logs
            .last()
            .map(|(_, meta)| TxRef(format!("{:?}", meta.transaction_hash))))
    }

    async fn claim_event(&self, id: [u8; 32]) -> Result<Option<(TxRef, Option<SecureSecret>)>, AdapterError> {
        let logs = self
            .contract
            .deposit_claimed_filter()
            .topic1(H256::from(id))
            .from_block(0u64)
            .query_with_meta()
            .await
            .map_err(err)?;
        Ok(logs.last().map(|(event, meta)| {
            (
                TxRef(format!("{:?}", meta.transaction_hash)),
                SecureSecret::from_slice(&event.secret),
            )
        }))
    }
}

struct RawDeposit {
    depositor: Address,
    claimer: Address,
    amount: Amount,
    expiry: u64,
    hashlock: Hashlock,
    claimed: bool,
    cancelled: bool,
}

impl RawDeposit {
    fn state(&self) -> DepositState {
        if self.claimed {
            DepositState::Claimed
        } else if self.cancelled {
            DepositState::Refunded
        } else {
            DepositState::Locked
        }
    }

    fn ensure_locked(&self) -> Result<(), AdapterError> {
        match self.state() {
            DepositState::Claimed => Err(AdapterError::AlreadyClaimed),
            DepositState::Refunded => Err(AdapterError::AlreadyRefunded),
            DepositState::Locked => Ok(()),
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmHtlcAdapter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    fn deposit_ref(&self, hashlock: &Hashlock) -> DepositRef {
        deposit_ref_for(self.chain, hashlock)
    }

    async fn deposit(
        &self,
        claimer: &str,
        amount: Amount,
        hashlock: &Hashlock,
        expiry: u64,
    ) -> Result<TxRef, AdapterError> {
        let claimer_address: Address = claimer
            .parse()
            .map_err(|_| AdapterError::Rejected(format!("invalid claimer address {}", claimer)))?;
        let id = *hashlock.as_bytes();

        if let Some(existing) = self.fetch(id).await? {
            let same = existing.amount == amount
                && existing.expiry == expiry
                && existing.claimer == claimer_address;
            if !same {
                return Err(AdapterError::DepositMismatch(format!(
                    "{} escrow already holds {} with different parameters",
                    self.chain, hashlock
                )));
            }
            debug!("[swap] {} deposit {} already on chain", self.chain, hashlock.short());
            return self
                .deposit_tx(id)
                .await?
                .ok_or_else(|| AdapterError::Unavailable("deposit event not indexed yet".into()));
        }

        let call = self
            .contract
            .deposit(claimer_address, EvmU256::from(expiry), id)
            .value(to_evm(amount));
        let pending = call.send().await.map_err(err)?;
        let tx_hash = *pending;
        info!("[swap] {} deposit {} sent in {:?}", self.chain, hashlock.short(), tx_hash);
        Ok(TxRef(format!("{:?}", tx_hash)))
    }

    async fn claim(&self, deposit: &DepositRef, secret: &SecureSecret) -> Result<TxRef, AdapterError> {
        let id = Self::deposit_id(deposit)?;
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))?;
        existing.ensure_locked()?;
        if self.block_timestamp().await? > existing.expiry {
            return Err(AdapterError::Expired);
        }

        let call = self
            .contract
            .claim(id, Bytes::from(secret.as_bytes().to_vec()));
        let pending = call.send().await.map_err(err)?;
        let tx_hash = *pending;
        info!("[swap] {} claim for {} sent in {:?}", self.chain, deposit, tx_hash);
        Ok(TxRef(format!("{:?}", tx_hash)))
    }

    async fn refund(&self, deposit: &DepositRef) -> Result<TxRef, AdapterError> {
        let id = Self::deposit_id(deposit)?;
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))?;
        existing.ensure_locked()?;
        if self.block_timestamp().await? <= existing.expiry {
            return Err(AdapterError::NotExpired);
        }

        let call = self.contract.cancel_deposit(id);
        let pending = call.send().await.map_err(err)?;
        let tx_hash = *pending;
        info!("[swap] {} refund for {} sent in {:?}", self.chain, deposit, tx_hash);
        Ok(TxRef(format!("{:?}", tx_hash)))
    }

    async fn get_deposit(&self, deposit: &DepositRef) -> Result<DepositInfo, AdapterError> {
        let id = Self::deposit_id(deposit)?;
        let raw = self
            .fetch(id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))?;

        let (claim_tx, revealed_secret) = if raw.claimed {
            match self.claim_event(id).await? {
                Some((tx, secret)) => (Some(tx), secret),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        Ok(DepositInfo {
            deposit_ref: deposit.clone(),
            depositor: address_string(raw.depositor),
            claimer: address_string(raw.claimer),
            amount: raw.amount,
            hashlock: raw.hashlock,
            expiry: raw.expiry,
            state: raw.state(),
            claim_tx,
            // cancelDeposit emits no event
            refund_tx: None,
            revealed_secret,
        })
    }

    async fn wait_for_confirmation(&self, tx: &TxRef, timeout: Duration) -> Result<(), AdapterError> {
        let hash: H256 = tx
            .0
            .parse()
            .map_err(|_| AdapterError::Rejected(format!("invalid transaction hash {}", tx)))?;

        let poll = async {
            loop {
                if let Some(receipt) = self.client.get_transaction_receipt(hash).await.map_err(err)? {
                    if receipt.status == Some(0u64.into()) {
                        return Err(AdapterError::Rejected(format!("transaction {} reverted", tx)));
                    }
                    if let Some(mined) = receipt.block_number {
                        let head = self.client.get_block_number().await.map_err(err)?;
                        let depth = head.as_u64().saturating_sub(mined.as_u64()) + 1;
                        if depth >= self.confirmations {
                            return Ok(());
                        }
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(tx.to_string())),
        }
    }
}
