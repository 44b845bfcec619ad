//! # Hashlock Encodings
//!
//! Chains disagree on how a 32-byte commitment travels: EVM contracts take
//! `bytes32` (raw), NEAR and Algorand contracts take base64 or hex strings,
//! Lightning uses bare hex. The digest is always the canonical one; only the
//! representation changes here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::domain::{AdapterError, ChainFamily, ChainId, DepositRef, Hashlock};

/// Wire representation of a hashlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashlockEncoding {
    /// 32 raw bytes.
    Raw,
    /// Lowercase hex, no prefix.
    Hex,
    /// Lowercase hex with `0x`.
    PrefixedHex,
    /// Standard base64 with padding.
    Base64,
}

impl HashlockEncoding {
    /// Text form a chain family's contracts and RPCs use for the hashlock.
    pub fn for_family(family: ChainFamily) -> Self {
        match family {
            ChainFamily::Evm => Self::PrefixedHex,
            ChainFamily::Near | ChainFamily::Algorand => Self::Base64,
            ChainFamily::Utxo | ChainFamily::Solana => Self::Hex,
        }
    }
}

/// Deposit reference for a hashlock on `chain`, in that chain's encoding.
pub fn deposit_ref_for(chain: ChainId, hashlock: &Hashlock) -> DepositRef {
    let wire = encode_hashlock(hashlock, HashlockEncoding::for_family(chain.family()));
    DepositRef(String::from_utf8_lossy(&wire).into_owned())
}

/// Render a hashlock for a chain.
pub fn encode_hashlock(hashlock: &Hashlock, encoding: HashlockEncoding) -> Vec<u8> {
    match encoding {
        HashlockEncoding::Raw => hashlock.as_bytes().to_vec(),
        HashlockEncoding::Hex => hashlock.to_hex().into_bytes(),
        HashlockEncoding::PrefixedHex => hashlock.to_string().into_bytes(),
        HashlockEncoding::Base64 => STANDARD.encode(hashlock.as_bytes()).into_bytes(),
    }
}

/// Parse a chain's representation back to the canonical digest.
pub fn normalize_hashlock(input: &[u8], encoding: HashlockEncoding) -> Result<Hashlock, AdapterError> {
    let bytes = match encoding {
        HashlockEncoding::Raw => input.to_vec(),
        HashlockEncoding::Hex | HashlockEncoding::PrefixedHex => {
            let text = std::str::from_utf8(input)
                .map_err(|_| AdapterError::Rejected("hashlock is not valid UTF-8".into()))?;
            let text = text.trim();
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            hex::decode(digits).map_err(|e| AdapterError::Rejected(format!("bad hashlock hex: {}", e)))?
        }
        HashlockEncoding::Base64 => STANDARD
            .decode(input)
            .map_err(|e| AdapterError::Rejected(format!("bad hashlock base64: {}", e)))?,
    };
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| AdapterError::Rejected(format!("hashlock is {} bytes, expected 32", b.len())))?;
    Ok(Hashlock::new(arr))
}
