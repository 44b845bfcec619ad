//! # Domain Module
//!
//! Swap order, value objects, errors and safety invariants.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod secure_secret;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use secure_secret::{SecureSecret, SECRET_LEN};
pub use value_objects::*;
