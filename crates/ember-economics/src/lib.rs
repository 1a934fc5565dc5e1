//! # Ember Economics - Essence Emission & Staking Vault
//!
//! Deterministic accrual engine for the Ember essence economy. Reward
//! budgets stream out of the flow ledger at a linear rate, the staking
//! vault distributes them across deposit power with a global
//! reward-per-power accumulator, and the utilization throttle scales the
//! distributed share by how much of the circulating supply is locked.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       ESSENCE PIPELINE                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  FlowLedger ──settle──▶ StakingVault ──harvest──▶ stakers        │
//! │      │                      │                                    │
//! │      │ rate/s               │ effectiveness(utilization)         │
//! │      ▼                      ▼                                    │
//! │  linear budget        distributed vs undistributed split         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock Tiers
//!
//! | Tier | Boost | Timelock | Vesting |
//! |------|-------|----------|---------|
//! | TwoWeeks | 10% | 14 days | none |
//! | OneMonth | 25% | 30 days | 7 days |
//! | ThreeMonths | 80% | 90 days | 14 days |
//! | SixMonths | 180% | 180 days | 30 days |
//! | TwelveMonths | 400% | 365 days | 45 days |
//!
//! All amounts are `u128` in 1e18 fixed point, all timestamps are `i64`
//! seconds, and every division truncates.

pub mod flow;
pub mod math;
pub mod power;
pub mod throttle;
pub mod tiers;
pub mod vault;

// Re-exports
pub use flow::{FlowCallback, FlowConfig, FlowLedger};
pub use power::PowerOracle;
pub use throttle::UtilizationCurve;
pub use tiers::LockTier;
pub use vault::{ArtifactStake, Position, RodStake, StakingVault};

/// Economy-wide constants
pub mod constants {
    /// Fixed-point scale shared by amounts, powers, and ratios
    pub const ONE: u128 = 1_000_000_000_000_000_000; // 10^18

    /// One day in seconds
    pub const DAY: i64 = 24 * 3600;

    /// Open deposits allowed per user
    pub const MAX_DEPOSITS_PER_USER: usize = 3_000;

    /// Absorber rod units stakeable per wallet
    pub const MAX_RODS_PER_WALLET: u64 = 20;

    /// Artifacts stakeable per wallet
    pub const MAX_ARTIFACTS_PER_WALLET: usize = 3;

    /// One-of-one artifacts stakeable per wallet
    pub const MAX_ONE_OF_ONE_PER_WALLET: usize = 1;

    /// Power granted by a single staked rod unit: 0.008
    pub const DEFAULT_ROD_POWER: u128 = ONE / 125;
}
