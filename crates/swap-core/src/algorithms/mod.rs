//! # Algorithms Module
//!
//! Secret generation and timelock selection.

pub mod secret;
pub mod timelocks;

pub use secret::SecretManager;
pub use timelocks::{calculate_timelocks, has_time_for, validate_swap_timelocks, Timelocks};
