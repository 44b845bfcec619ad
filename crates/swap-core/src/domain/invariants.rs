//! # Domain Invariants
//!
//! Safety rules checked by the coordinator before it touches a chain.

use sha2::{Digest, Sha256};

use super::entities::{SwapLeg, SwapOrder};
use super::errors::SwapError;
use super::secure_secret::SecureSecret;
use super::value_objects::{DepositInfo, DepositState, Hashlock, SwapStatus};

/// Canonical hashlock function: SHA-256 over the raw 32 secret bytes.
pub fn canonical_hash(secret: &SecureSecret) -> Hashlock {
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hashlock::new(out)
}

/// Invariant: destination expires strictly before source, with a margin.
///
/// The margin is the window the resolver has to claim the source leg after
/// the secret became public on the destination leg.
pub fn invariant_timelock_ordering(
    src_timelock: u64,
    dst_timelock: u64,
    min_margin_secs: u64,
) -> Result<(), SwapError> {
    let ordered = dst_timelock < src_timelock;
    let margin_ok = src_timelock.saturating_sub(dst_timelock) >= min_margin_secs;
    if !ordered || !margin_ok {
        return Err(SwapError::InvalidTimelocks {
            src_timelock,
            dst_timelock,
            required_margin: min_margin_secs,
        });
    }
    Ok(())
}

/// Invariant: `H(secret) == hashlock`.
pub fn invariant_secret_matches(secret: &SecureSecret, hashlock: &Hashlock) -> bool {
    canonical_hash(secret) == *hashlock
}

/// Invariant: the secret is present iff the status reveals it.
pub fn invariant_secret_state(order: &SwapOrder) -> bool {
    order.secret.is_some() == order.status.reveals_secret()
}

/// Invariant: the secret may only be revealed once both deposits are confirmed.
pub fn invariant_reveal_allowed(order: &SwapOrder) -> Result<(), SwapError> {
    if order.status != SwapStatus::DstDeposited {
        return Err(SwapError::InvariantViolation(format!(
            "secret reveal attempted in {}",
            order.status
        )));
    }
    if order.source.deposit_tx.is_none() || order.destination.deposit_tx.is_none() {
        return Err(SwapError::InvariantViolation(
            "secret reveal attempted without both deposits recorded".into(),
        ));
    }
    Ok(())
}

/// Invariant: the on-chain escrow matches what the order expects.
///
/// The depositor is not compared: it is whatever identity the chain's signer
/// uses, which may differ in format from the address the caller supplied.
pub fn invariant_deposit_matches(
    leg: &SwapLeg,
    hashlock: &Hashlock,
    info: &DepositInfo,
) -> Result<(), String> {
    if info.hashlock != *hashlock {
        return Err(format!(
            "{} deposit hashlock {} != order hashlock {}",
            leg.chain, info.hashlock, hashlock
        ));
    }
    if info.amount != leg.amount {
        return Err(format!(
            "{} deposit amount {} != order amount {}",
            leg.chain, info.amount, leg.amount
        ));
    }
    if !info.claimer.eq_ignore_ascii_case(&leg.claimer) {
        return Err(format!(
            "{} deposit claimer {} != order claimer {}",
            leg.chain, info.claimer, leg.claimer
        ));
    }
    if info.expiry != leg.timelock {
        return Err(format!(
            "{} deposit expiry {} != order timelock {}",
            leg.chain, info.expiry, leg.timelock
        ));
    }
    Ok(())
}

/// Deposit is still locked and untouched.
pub fn deposit_is_locked(info: &DepositInfo) -> bool {
    info.state == DepositState::Locked
}
