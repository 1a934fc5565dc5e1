//! Power oracle
//!
//! Resolves the boost power of staked NFTs. Artifact power is a
//! generation/rarity table resolved through the external metadata source;
//! rod power is a flat per-unit value. Powers are snapshotted by the vault
//! at stake time, so later table edits only affect future stakes.

use ember_core::error::{EmberError, Result};
use ember_core::token::MetadataHandle;
use ember_core::types::TokenId;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ROD_POWER, ONE};

/// Generations tracked by the artifact power table
pub const GENERATIONS: usize = 2;

/// Rarity classes per generation
pub const RARITIES: usize = 5;

/// NFT boost power resolver
#[derive(Clone, Serialize, Deserialize)]
pub struct PowerOracle {
    #[serde(skip)]
    metadata: Option<MetadataHandle>,
    /// Artifact power by [generation][rarity], 1e18 fixed point
    table: [[u128; RARITIES]; GENERATIONS],
    /// Flat per-unit rod power
    rod_power: u128,
}

impl std::fmt::Debug for PowerOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerOracle")
            .field("table", &self.table)
            .field("rod_power", &self.rod_power)
            .finish()
    }
}

impl PowerOracle {
    /// Oracle with the launch power table
    ///
    /// Generation 0 (primal): 6.0, 2.0, 0.75, 1.0, 0.5 by rarity.
    /// Generation 1: 0.4, 0.25, 0.15, 0.1, 0.05.
    pub fn new(metadata: MetadataHandle) -> Self {
        Self {
            metadata: Some(metadata),
            table: [
                [
                    6 * ONE,
                    2 * ONE,
                    ONE * 75 / 100,
                    ONE,
                    ONE / 2,
                ],
                [
                    ONE * 4 / 10,
                    ONE / 4,
                    ONE * 15 / 100,
                    ONE / 10,
                    ONE / 20,
                ],
            ],
            rod_power: DEFAULT_ROD_POWER,
        }
    }

    /// Power for a generation/rarity pair, zero when out of range
    pub fn power_for(&self, generation: u8, rarity: u8) -> u128 {
        self.table
            .get(generation as usize)
            .and_then(|row| row.get(rarity as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Power of a specific artifact, via the metadata source
    pub fn artifact_power(&self, token_id: TokenId) -> Result<u128> {
        let meta = self.metadata()?.read().metadata_for_artifact(token_id)?;
        Ok(self.power_for(meta.generation, meta.rarity))
    }

    /// Whether an artifact is a one-of-one (generation 0, rarity 0)
    pub fn is_one_of_one(&self, token_id: TokenId) -> Result<bool> {
        let meta = self.metadata()?.read().metadata_for_artifact(token_id)?;
        Ok(meta.generation == 0 && meta.rarity == 0)
    }

    /// Per-unit rod power
    pub fn rod_power(&self) -> u128 {
        self.rod_power
    }

    /// Power of a rod stack; scales linearly with the unit count
    pub fn rod_stack_power(&self, amount: u64) -> u128 {
        self.rod_power * amount as u128
    }

    /// The full artifact power table
    pub fn table(&self) -> &[[u128; RARITIES]; GENERATIONS] {
        &self.table
    }

    /// Replace one table entry
    pub fn set_power(&mut self, generation: u8, rarity: u8, power: u128) -> Result<()> {
        let row = self
            .table
            .get_mut(generation as usize)
            .ok_or(EmberError::InvalidPowerTable)?;
        let slot = row
            .get_mut(rarity as usize)
            .ok_or(EmberError::InvalidPowerTable)?;
        *slot = power;
        Ok(())
    }

    /// Replace the per-unit rod power
    pub fn set_rod_power(&mut self, power: u128) {
        self.rod_power = power;
    }

    /// Swap in a metadata source (after deserialization)
    pub fn set_metadata(&mut self, metadata: MetadataHandle) {
        self.metadata = Some(metadata);
    }

    fn metadata(&self) -> Result<&MetadataHandle> {
        self.metadata
            .as_ref()
            .ok_or(EmberError::InvalidPowerTable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::token::{ArtifactMetadata, MemoryMetadata};

    fn oracle_with(entries: &[(TokenId, u8, u8)]) -> PowerOracle {
        let mut store = MemoryMetadata::new();
        for &(id, generation, rarity) in entries {
            store.set(id, ArtifactMetadata { generation, rarity });
        }
        PowerOracle::new(store.into_handle())
    }

    #[test]
    fn test_default_table() {
        let oracle = oracle_with(&[(1, 0, 0), (2, 0, 2), (3, 1, 4)]);
        assert_eq!(oracle.artifact_power(1).unwrap(), 6 * ONE);
        assert_eq!(oracle.artifact_power(2).unwrap(), ONE * 75 / 100);
        assert_eq!(oracle.artifact_power(3).unwrap(), ONE / 20);
        assert_eq!(oracle.rod_power(), ONE / 125);
        assert_eq!(oracle.rod_stack_power(10), 10 * ONE / 125);
        assert_eq!(oracle.table()[0][0], 6 * ONE);
    }

    #[test]
    fn test_out_of_range_is_zero_power() {
        let oracle = oracle_with(&[(9, 7, 0), (10, 0, 9)]);
        assert_eq!(oracle.artifact_power(9).unwrap(), 0);
        assert_eq!(oracle.artifact_power(10).unwrap(), 0);
        assert_eq!(oracle.power_for(2, 0), 0);
        assert_eq!(oracle.power_for(0, 5), 0);
    }

    #[test]
    fn test_one_of_one_detection() {
        let oracle = oracle_with(&[(1, 0, 0), (2, 0, 1), (3, 1, 0)]);
        assert!(oracle.is_one_of_one(1).unwrap());
        assert!(!oracle.is_one_of_one(2).unwrap());
        assert!(!oracle.is_one_of_one(3).unwrap());
        assert!(matches!(
            oracle.is_one_of_one(99),
            Err(EmberError::MetadataNotFound(99))
        ));
    }

    #[test]
    fn test_table_edits() {
        let mut oracle = oracle_with(&[(1, 1, 1)]);
        oracle.set_power(1, 1, 3 * ONE).unwrap();
        assert_eq!(oracle.artifact_power(1).unwrap(), 3 * ONE);
        assert!(oracle.set_power(2, 0, ONE).is_err());
        assert!(oracle.set_power(0, 5, ONE).is_err());

        oracle.set_rod_power(ONE / 100);
        assert_eq!(oracle.rod_power(), ONE / 100);
    }
}
