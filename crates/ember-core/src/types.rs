//! Identifier types for the Ember essence economy
//!
//! Accounts are opaque 32-byte identifiers. In an on-chain deployment they
//! would be derived from addresses or public keys; in simulation they are
//! derived from arbitrary seeds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// AccountId - unique identifier for a participant (player, contract, treasury)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId {
    /// 256-bit BLAKE3 hash
    id: [u8; 32],
}

impl AccountId {
    /// Create an AccountId from raw bytes
    pub fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive an AccountId from an arbitrary seed using BLAKE3
    pub fn from_seed(seed: &[u8]) -> Self {
        let hash = blake3::hash(seed);
        Self {
            id: *hash.as_bytes(),
        }
    }

    /// Derive an AccountId from a public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_seed(public_key)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Zero/null AccountId
    pub const ZERO: Self = Self { id: [0u8; 32] };
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// TokenId - identifier for an NFT within a collection
pub type TokenId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_from_seed() {
        let a = AccountId::from_seed(b"staker1");
        let b = AccountId::from_seed(b"staker1");
        let c = AccountId::from_seed(b"staker2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_is_short_hex() {
        let a = AccountId::from_seed(b"treasury");
        let shown = format!("{}", a);

        assert_eq!(shown.len(), 16);
        assert!(a.to_hex().starts_with(&shown));
    }

    #[test]
    fn test_zero_account() {
        assert_eq!(AccountId::ZERO.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let a = AccountId::from_seed(b"staker1");
        let json = serde_json::to_string(&a).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
