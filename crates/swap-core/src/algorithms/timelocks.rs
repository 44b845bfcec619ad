//! # Timelock Calculation
//!
//! Picks leg expiries at creation time and checks caller-supplied ones.

use crate::config::SwapConfig;
use crate::domain::{invariant_timelock_ordering, ChainId, SwapError};

/// Absolute expiries for both legs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timelocks {
    /// Source leg expiry.
    pub src: u64,
    /// Destination leg expiry.
    pub dst: u64,
}

/// Calculate timelocks for a new swap.
///
/// The destination leg must outlive both deposits' finality plus the deposit
/// and reveal windows; the source leg must outlive the destination leg by the
/// configured margin and by the source chain's own finality, so the resolver can
/// still claim after the secret goes public.
pub fn calculate_timelocks(
    from_chain: ChainId,
    to_chain: ChainId,
    now: u64,
    config: &SwapConfig,
) -> Timelocks {
    let policy = &config.timelocks;
    let dst_floor = from_chain.finality_secs()
        + to_chain.finality_secs()
        + config.deposit_window_secs
        + config.reveal_window_secs;
    let dst = now + policy.dst_secs.max(dst_floor);

    let margin = policy.min_margin_secs.max(from_chain.finality_secs());
    let src = (now + policy.src_secs).max(dst + margin);

    Timelocks { src, dst }
}

/// Validate caller-supplied timelocks.
pub fn validate_swap_timelocks(
    timelocks: Timelocks,
    now: u64,
    config: &SwapConfig,
) -> Result<(), SwapError> {
    invariant_timelock_ordering(timelocks.src, timelocks.dst, config.timelocks.min_margin_secs)?;
    let earliest_dst = now + config.deposit_window_secs + config.reveal_window_secs;
    if timelocks.dst <= earliest_dst {
        return Err(SwapError::InvalidTimelocks {
            src_timelock: timelocks.src,
            dst_timelock: timelocks.dst,
            required_margin: config.timelocks.min_margin_secs,
        });
    }
    Ok(())
}

/// Enough time left before `deadline` to start an action needing `window` seconds.
pub fn has_time_for(now: u64, deadline: u64, window: u64) -> bool {
    now.saturating_add(window) < deadline
}
