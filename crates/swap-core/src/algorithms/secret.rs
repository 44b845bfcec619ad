//! # Secret Generation and Hashlocks
//!
//! The only place swap secrets are created. Hashing uses the canonical
//! function from the domain invariants (SHA-256 over raw bytes); encoding
//! differences between chains are handled by the adapters, never here.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::{canonical_hash, invariant_secret_matches, Hashlock, SecureSecret, SECRET_LEN};

/// Generates secrets and computes hashlocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecretManager;

impl SecretManager {
    /// Create a manager.
    pub fn new() -> Self {
        Self
    }

    /// Draw a 256-bit secret from the operating system CSPRNG.
    pub fn generate_secret(&self) -> SecureSecret {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        let secret = SecureSecret::new(bytes);
        zeroize::Zeroize::zeroize(&mut bytes);
        secret
    }

    /// `H(secret)`.
    pub fn compute_hashlock(&self, secret: &SecureSecret) -> Hashlock {
        canonical_hash(secret)
    }

    /// Fresh `(secret, hashlock)` pair.
    pub fn generate_pair(&self) -> (SecureSecret, Hashlock) {
        let secret = self.generate_secret();
        let hashlock = self.compute_hashlock(&secret);
        (secret, hashlock)
    }

    /// Check a candidate preimage against a hashlock.
    pub fn verify(&self, secret: &SecureSecret, hashlock: &Hashlock) -> bool {
        invariant_secret_matches(secret, hashlock)
    }
}
