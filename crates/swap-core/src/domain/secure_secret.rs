//! # Secure Secret Type
//!
//! Swap preimage wrapper that zeroizes memory on drop and never prints its bytes.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret length in bytes (256 bits).
pub const SECRET_LEN: usize = 32;

/// A 32-byte swap secret.
///
/// `Debug` output is redacted; serialization is lowercase hex, used only by the
/// store's secret vault.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureSecret {
    inner: [u8; SECRET_LEN],
}

impl SecureSecret {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; SECRET_LEN]) -> Self {
        Self { inner: bytes }
    }

    /// Create from a slice of exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let inner: [u8; SECRET_LEN] = slice.try_into().ok()?;
        Some(Self { inner })
    }

    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = hex::decode(s.trim().trim_start_matches("0x")).ok()?;
        let secret = Self::from_slice(&bytes);
        bytes.zeroize();
        secret
    }

    /// Borrow the secret bytes. Do not keep the reference around.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.inner
    }

    /// Hex encoding, for adapters that submit the preimage as a string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner)
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &SecureSecret) -> bool {
        self.inner
            .iter()
            .zip(other.inner.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureSecret(***)")
    }
}

impl Serialize for SecureSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecureSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut s = String::deserialize(deserializer)?;
        let secret = Self::from_hex(&s);
        s.zeroize();
        secret.ok_or_else(|| serde::de::Error::custom("invalid secret encoding"))
    }
}
