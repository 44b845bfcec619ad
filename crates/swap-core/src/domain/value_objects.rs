//! # Domain Value Objects
//!
//! Immutable value types shared by the coordinator, the adapters and the store.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::secure_secret::SecureSecret;

/// Token amount in a chain's smallest unit.
pub type Amount = U256;

/// Chain family: one adapter implementation per family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    /// Account-based EVM chains with an HTLC escrow contract.
    Evm,
    /// Bitcoin / Lightning invoice-hash locks.
    Utxo,
    /// NEAR escrow contract.
    Near,
    /// Algorand application call.
    Algorand,
    /// Solana program.
    Solana,
}

/// Supported chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainId {
    /// Ethereum mainnet or testnet.
    Ethereum,
    /// Polygon PoS.
    Polygon,
    /// Arbitrum L2.
    Arbitrum,
    /// Bitcoin / Lightning.
    Bitcoin,
    /// NEAR protocol.
    Near,
    /// Algorand.
    Algorand,
    /// Solana.
    Solana,
}

impl ChainId {
    /// All supported chains.
    pub const ALL: [ChainId; 7] = [
        ChainId::Ethereum,
        ChainId::Polygon,
        ChainId::Arbitrum,
        ChainId::Bitcoin,
        ChainId::Near,
        ChainId::Algorand,
        ChainId::Solana,
    ];

    /// Family of the chain.
    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Ethereum | ChainId::Polygon | ChainId::Arbitrum => ChainFamily::Evm,
            ChainId::Bitcoin => ChainFamily::Utxo,
            ChainId::Near => ChainFamily::Near,
            ChainId::Algorand => ChainFamily::Algorand,
            ChainId::Solana => ChainFamily::Solana,
        }
    }

    /// Default confirmation depth before a transaction counts as final.
    pub fn required_confirmations(&self) -> u64 {
        match self {
            ChainId::Ethereum => 12, // PoS, 2 epochs
            ChainId::Polygon => 128,
            ChainId::Arbitrum => 1, // L2, verified by L1
            ChainId::Bitcoin => 6,
            ChainId::Near => 3,
            ChainId::Algorand => 1, // instant finality
            ChainId::Solana => 32,  // finalized commitment
        }
    }

    /// Estimated block time in seconds.
    pub fn block_time_secs(&self) -> u64 {
        match self {
            ChainId::Ethereum => 12,
            ChainId::Polygon => 2,
            ChainId::Arbitrum => 1,
            ChainId::Bitcoin => 600,
            ChainId::Near => 1,
            ChainId::Algorand => 3,
            ChainId::Solana => 1,
        }
    }

    /// Expected seconds until a transaction is final.
    pub fn finality_secs(&self) -> u64 {
        self.required_confirmations() * self.block_time_secs()
    }

    /// Lowercase name used in store keys and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Bitcoin => "bitcoin",
            ChainId::Near => "near",
            ChainId::Algorand => "algorand",
            ChainId::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" | "sepolia" => Ok(ChainId::Ethereum),
            "polygon" | "matic" | "amoy" => Ok(ChainId::Polygon),
            "arbitrum" | "arb" => Ok(ChainId::Arbitrum),
            "bitcoin" | "btc" | "lightning" => Ok(ChainId::Bitcoin),
            "near" => Ok(ChainId::Near),
            "algorand" | "algo" => Ok(ChainId::Algorand),
            "solana" | "sol" => Ok(ChainId::Solana),
            other => Err(format!("unknown chain '{}'", other)),
        }
    }
}

/// Swap order state machine.
///
/// ```text
/// Created ─► SrcDeposited ─► DstDeposited ─► SecretRevealed ─► DstClaimed ─► Completed
///    │             │               │
///    │             └───────┬───────┘
///    │                     ▼
///    ├──────────────► Refunding ─► Refunded
///    └─► Expired
///
/// Any pre-Completed status may move to Failed.
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    /// Persisted, nothing confirmed on chain yet.
    #[default]
    Created,
    /// Source deposit confirmed.
    SrcDeposited,
    /// Destination deposit confirmed.
    DstDeposited,
    /// Destination claim broadcast, secret public.
    SecretRevealed,
    /// Destination claim confirmed.
    DstClaimed,
    /// Source claim confirmed.
    Completed,
    /// Never funded and no longer completable.
    Expired,
    /// Refund path entered.
    Refunding,
    /// Every funded leg refunded or otherwise closed.
    Refunded,
    /// Unrecoverable error, manual intervention required.
    Failed,
}

impl SwapStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        use SwapStatus::*;
        match (self, next) {
            (Created, SrcDeposited | Expired | Refunding | Failed) => true,
            (SrcDeposited, DstDeposited | Refunding | Failed) => true,
            (DstDeposited, SecretRevealed | Refunding | Failed) => true,
            (SecretRevealed, DstClaimed | Failed) => true,
            (DstClaimed, Completed | Failed) => true,
            (Refunding, Refunded | Failed) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Refunded | Self::Failed | Self::Expired
        )
    }

    /// Statuses in which the order carries the secret.
    pub fn reveals_secret(&self) -> bool {
        matches!(self, Self::SecretRevealed | Self::DstClaimed | Self::Completed)
    }

    /// Statuses the expiry monitor is allowed to act on.
    pub fn is_refund_candidate(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::SrcDeposited | Self::DstDeposited | Self::Refunding
        )
    }

    /// All statuses, in state machine order.
    pub const ALL: [SwapStatus; 10] = [
        SwapStatus::Created,
        SwapStatus::SrcDeposited,
        SwapStatus::DstDeposited,
        SwapStatus::SecretRevealed,
        SwapStatus::DstClaimed,
        SwapStatus::Completed,
        SwapStatus::Expired,
        SwapStatus::Refunding,
        SwapStatus::Refunded,
        SwapStatus::Failed,
    ];
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Asset on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    /// The chain's native coin.
    Native,
    /// Token contract, mint or ASA id.
    Token(String),
}

impl AssetId {
    /// Whether this is the chain's native coin.
    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => f.write_str("native"),
            AssetId::Token(addr) => f.write_str(addr),
        }
    }
}

/// Swap order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapId(Uuid);

impl SwapId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SwapId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SwapId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// SHA-256 commitment to a swap secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hashlock([u8; 32]);

impl Hashlock {
    /// Wrap raw digest bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without prefix (store key form).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl fmt::Debug for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hashlock(0x{})", self.to_hex())
    }
}

impl fmt::Display for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Serialize for Hashlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hashlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("hashlock must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

/// Chain transaction reference returned by an adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain deposit identifier, derived deterministically from the hashlock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositRef(pub String);

impl fmt::Display for DepositRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Side of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// User deposits, resolver claims.
    Source,
    /// Resolver deposits, user claims.
    Destination,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Source => f.write_str("src"),
            Leg::Destination => f.write_str("dst"),
        }
    }
}

/// On-chain escrow state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositState {
    /// Funds locked, awaiting claim or expiry.
    Locked,
    /// Secret revealed, funds paid to the claimer.
    Claimed,
    /// Funds returned to the depositor.
    Refunded,
}

/// Snapshot of an escrow as reported by the chain.
#[derive(Clone, Debug)]
pub struct DepositInfo {
    /// Deposit identifier.
    pub deposit_ref: DepositRef,
    /// Address that locked the funds.
    pub depositor: String,
    /// Address allowed to claim.
    pub claimer: String,
    /// Locked amount.
    pub amount: Amount,
    /// Commitment stored on chain.
    pub hashlock: Hashlock,
    /// Absolute expiry (unix seconds).
    pub expiry: u64,
    /// Current state.
    pub state: DepositState,
    /// Claim transaction, when claimed and known.
    pub claim_tx: Option<TxRef>,
    /// Refund transaction, when refunded and known.
    pub refund_tx: Option<TxRef>,
    /// Preimage published by the claim, when the chain exposes it.
    pub revealed_secret: Option<SecureSecret>,
}
