//! Capability interfaces for external token collaborators
//!
//! The engine never implements token semantics itself; it moves balances
//! through these traits. An on-chain deployment would back them with the
//! host environment's ERC20/1155/721-style primitives. The in-memory
//! implementations here are the reference collaborators used in simulation
//! and throughout the test suites.

use crate::error::{EmberError, Result};
use crate::types::{AccountId, TokenId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Fungible token capability (essence)
pub trait FungibleToken {
    /// Total minted supply
    fn total_supply(&self) -> u128;

    /// Balance of one account
    fn balance_of(&self, account: &AccountId) -> u128;

    /// Move `amount` between accounts
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u128) -> Result<()>;

    /// Mint new supply to an account
    fn mint(&mut self, to: &AccountId, amount: u128);
}

/// Stackable NFT capability (absorber rods, ERC-1155-like)
pub trait StackableCollection {
    /// Balance of one token id for an account
    fn balance_of(&self, account: &AccountId, token_id: TokenId) -> u64;

    /// Move `amount` units of `token_id` between accounts
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        token_id: TokenId,
        amount: u64,
    ) -> Result<()>;

    /// Mint units of a token id to an account
    fn mint(&mut self, to: &AccountId, token_id: TokenId, amount: u64);
}

/// Unique NFT capability (artifacts, ERC-721-like)
pub trait UniqueCollection {
    /// Current owner of a token, if it exists
    fn owner_of(&self, token_id: TokenId) -> Option<AccountId>;

    /// Move a token between accounts; `from` must be the current owner
    fn transfer(&mut self, from: &AccountId, to: &AccountId, token_id: TokenId) -> Result<()>;

    /// Mint a token to an account
    fn mint(&mut self, to: &AccountId, token_id: TokenId);
}

/// Artifact metadata as held by the external metadata store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Generation: 0 = primal, 1 = secondary
    pub generation: u8,
    /// Rarity: 0 = legendary (top tier) down to 4 = common
    pub rarity: u8,
}

/// Metadata lookup capability
pub trait ArtifactMetadataSource {
    /// Metadata for an artifact token
    fn metadata_for_artifact(&self, token_id: TokenId) -> Result<ArtifactMetadata>;
}

/// Shared handle aliases used to wire collaborators into the engine
pub type TokenHandle = Arc<RwLock<dyn FungibleToken + Send + Sync>>;
pub type StackableHandle = Arc<RwLock<dyn StackableCollection + Send + Sync>>;
pub type UniqueHandle = Arc<RwLock<dyn UniqueCollection + Send + Sync>>;
pub type MetadataHandle = Arc<RwLock<dyn ArtifactMetadataSource + Send + Sync>>;

/// In-memory fungible token ledger
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryToken {
    balances: HashMap<AccountId, u128>,
    total_supply: u128,
}

impl MemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into a shared handle
    pub fn into_handle(self) -> TokenHandle {
        Arc::new(RwLock::new(self))
    }
}

impl FungibleToken for MemoryToken {
    fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u128) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(EmberError::InsufficientBalance {
                account: *from,
                balance,
                requested: amount,
            });
        }
        *self.balances.entry(*from).or_default() -= amount;
        *self.balances.entry(*to).or_default() += amount;
        Ok(())
    }

    fn mint(&mut self, to: &AccountId, amount: u128) {
        *self.balances.entry(*to).or_default() += amount;
        self.total_supply += amount;
    }
}

/// In-memory stackable NFT ledger
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryStackable {
    balances: HashMap<(AccountId, TokenId), u64>,
}

impl MemoryStackable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> StackableHandle {
        Arc::new(RwLock::new(self))
    }
}

impl StackableCollection for MemoryStackable {
    fn balance_of(&self, account: &AccountId, token_id: TokenId) -> u64 {
        self.balances.get(&(*account, token_id)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        token_id: TokenId,
        amount: u64,
    ) -> Result<()> {
        let balance = self.balance_of(from, token_id);
        if balance < amount {
            return Err(EmberError::InsufficientStakedBalance {
                staked: balance,
                requested: amount,
            });
        }
        *self.balances.entry((*from, token_id)).or_default() -= amount;
        *self.balances.entry((*to, token_id)).or_default() += amount;
        Ok(())
    }

    fn mint(&mut self, to: &AccountId, token_id: TokenId, amount: u64) {
        *self.balances.entry((*to, token_id)).or_default() += amount;
    }
}

/// In-memory unique NFT ledger
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryUnique {
    owners: HashMap<TokenId, AccountId>,
}

impl MemoryUnique {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> UniqueHandle {
        Arc::new(RwLock::new(self))
    }
}

impl UniqueCollection for MemoryUnique {
    fn owner_of(&self, token_id: TokenId) -> Option<AccountId> {
        self.owners.get(&token_id).copied()
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, token_id: TokenId) -> Result<()> {
        match self.owners.get(&token_id) {
            Some(owner) if owner == from => {
                self.owners.insert(token_id, *to);
                Ok(())
            }
            _ => Err(EmberError::NotOwner(token_id)),
        }
    }

    fn mint(&mut self, to: &AccountId, token_id: TokenId) {
        self.owners.insert(token_id, *to);
    }
}

/// In-memory artifact metadata store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    entries: HashMap<TokenId, ArtifactMetadata>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> MetadataHandle {
        Arc::new(RwLock::new(self))
    }

    /// Register metadata for a token
    pub fn set(&mut self, token_id: TokenId, metadata: ArtifactMetadata) {
        self.entries.insert(token_id, metadata);
    }
}

impl ArtifactMetadataSource for MemoryMetadata {
    fn metadata_for_artifact(&self, token_id: TokenId) -> Result<ArtifactMetadata> {
        self.entries
            .get(&token_id)
            .copied()
            .ok_or(EmberError::MetadataNotFound(token_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fungible_transfer() {
        let a = AccountId::from_seed(b"a");
        let b = AccountId::from_seed(b"b");
        let mut token = MemoryToken::new();

        token.mint(&a, 100);
        assert_eq!(token.total_supply(), 100);

        token.transfer(&a, &b, 40).unwrap();
        assert_eq!(token.balance_of(&a), 60);
        assert_eq!(token.balance_of(&b), 40);

        let err = token.transfer(&a, &b, 1000).unwrap_err();
        assert!(matches!(err, EmberError::InsufficientBalance { .. }));
        // failed transfer left balances untouched
        assert_eq!(token.balance_of(&a), 60);
    }

    #[test]
    fn test_stackable_transfer() {
        let a = AccountId::from_seed(b"a");
        let b = AccountId::from_seed(b"b");
        let mut rods = MemoryStackable::new();

        rods.mint(&a, 7, 5);
        rods.transfer(&a, &b, 7, 3).unwrap();
        assert_eq!(rods.balance_of(&a, 7), 2);
        assert_eq!(rods.balance_of(&b, 7), 3);

        assert!(rods.transfer(&a, &b, 7, 3).is_err());
    }

    #[test]
    fn test_unique_ownership() {
        let a = AccountId::from_seed(b"a");
        let b = AccountId::from_seed(b"b");
        let mut artifacts = MemoryUnique::new();

        artifacts.mint(&a, 42);
        assert_eq!(artifacts.owner_of(42), Some(a));

        // only the owner may move it
        assert!(artifacts.transfer(&b, &a, 42).is_err());
        artifacts.transfer(&a, &b, 42).unwrap();
        assert_eq!(artifacts.owner_of(42), Some(b));
    }

    #[test]
    fn test_metadata_lookup() {
        let mut store = MemoryMetadata::new();
        store.set(
            55,
            ArtifactMetadata {
                generation: 0,
                rarity: 0,
            },
        );

        assert_eq!(
            store.metadata_for_artifact(55).unwrap(),
            ArtifactMetadata {
                generation: 0,
                rarity: 0
            }
        );
        assert!(matches!(
            store.metadata_for_artifact(56),
            Err(EmberError::MetadataNotFound(56))
        ));
    }
}
