//! Error types for the Ember essence economy engine
//!
//! Every failure is a synchronous rejection with no partial state mutation.
//! Variants are grouped into the four categories the engine distinguishes:
//! authorization failures (checked before anything else), input validation,
//! state conflicts, and policy violations.

use crate::roles::Role;
use crate::types::{AccountId, TokenId};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EmberError>;

/// Errors that can occur in engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmberError {
    // === Authorization ===
    /// Caller lacks the role required for an admin operation
    #[error("Caller is missing required role: {0}")]
    MissingRole(Role),

    // === Validation ===
    /// Amount must be non-zero
    #[error("Amount is 0")]
    ZeroAmount,

    /// Reward budget must be non-zero
    #[error("Rewards are 0")]
    ZeroRewards,

    /// Emission window is empty or inverted
    #[error("Invalid time window: start {start}, end {end}")]
    InvalidTimeWindow { start: i64, end: i64 },

    /// Lock tier index outside the tier table
    #[error("Invalid lock tier: {0}")]
    InvalidLockTier(u8),

    /// Utilization curve is unsorted, unbounded, or non-monotonic
    #[error("Invalid utilization curve")]
    InvalidCurve,

    /// Artifact power table has wrong shape or out-of-range entries
    #[error("Invalid artifact power table")]
    InvalidPowerTable,

    // === State Conflicts ===
    /// A flow for this recipient already exists
    #[error("Flow for recipient already exists: {0}")]
    FlowExists(AccountId),

    /// No flow configured for this recipient
    #[error("Flow not found for recipient: {0}")]
    FlowNotFound(AccountId),

    /// Deposit id does not exist for this owner
    #[error("Position not found: owner {owner}, deposit {deposit_id}")]
    PositionNotFound { owner: AccountId, deposit_id: u64 },

    /// Artifact is already held by the vault
    #[error("NFT already staked: {0}")]
    NftAlreadyStaked(TokenId),

    /// Metadata source has no record for this token
    #[error("No metadata for token {0}")]
    MetadataNotFound(TokenId),

    // === Policy Violations ===
    /// Position timelock has not elapsed
    #[error("Position is still locked until {unlocks_at}")]
    StillLocked { unlocks_at: i64 },

    /// Requested principal exceeds the vested, not-yet-withdrawn amount
    #[error("Amount exceeds vested principal: vested {vested}, requested {requested}")]
    NotVested { vested: u128, requested: u128 },

    /// Requested principal exceeds what remains in the position
    #[error("Withdraw amount too big: remaining {remaining}, requested {requested}")]
    WithdrawTooBig { remaining: u128, requested: u128 },

    /// Per-user position count cap reached
    #[error("Max deposits number reached: {0}")]
    MaxDepositsReached(usize),

    /// Per-wallet absorber rod cap exceeded
    #[error("Max {cap} absorber rods per wallet: {staked} already staked")]
    MaxRodsExceeded { staked: u64, cap: u64 },

    /// Per-wallet artifact cap exceeded
    #[error("Max {0} artifacts per wallet")]
    MaxArtifactsExceeded(usize),

    /// At most one 1-of-1 artifact may be staked per wallet
    #[error("Max 1 1/1 artifact per wallet")]
    MaxOneOfOneExceeded,

    /// Artifact is not staked by this caller
    #[error("NFT is not staked: {0}")]
    NftNotStaked(TokenId),

    /// Unstake amount exceeds the staked stack
    #[error("Insufficient staked balance: staked {staked}, requested {requested}")]
    InsufficientStakedBalance { staked: u64, requested: u64 },

    /// Defund amount exceeds the flow's unpaid budget
    #[error("Defund exceeds unpaid budget: unpaid {unpaid}, requested {requested}")]
    DefundTooBig { unpaid: u128, requested: u128 },

    /// Sweep amount exceeds tokens not earmarked to any flow
    #[error("Insufficient unearmarked balance: available {available}, requested {requested}")]
    InsufficientUnearmarked { available: u128, requested: u128 },

    /// Address is not on the exclusion list
    #[error("Address is not excluded: {0}")]
    NotExcluded(AccountId),

    /// Address is already on the exclusion list
    #[error("Address is already excluded: {0}")]
    AlreadyExcluded(AccountId),

    /// Token balance too small for the requested movement
    #[error("Insufficient balance for account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: u128,
        requested: u128,
    },

    /// Unique token does not exist or is owned by someone else
    #[error("Not the owner of token {0}")]
    NotOwner(TokenId),
}

/// Error categories matching the engine's failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks a required role; checked before any other validation
    Authorization,
    /// Malformed input (zero amounts, inverted windows, bad indices)
    Validation,
    /// Operation conflicts with existing state (duplicates, missing records)
    StateConflict,
    /// A configured rule rejected an otherwise well-formed request
    Policy,
}

impl EmberError {
    /// Classify the error into the engine taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingRole(_) => ErrorKind::Authorization,

            Self::ZeroAmount
            | Self::ZeroRewards
            | Self::InvalidTimeWindow { .. }
            | Self::InvalidLockTier(_)
            | Self::InvalidCurve
            | Self::InvalidPowerTable => ErrorKind::Validation,

            Self::FlowExists(_)
            | Self::FlowNotFound(_)
            | Self::PositionNotFound { .. }
            | Self::NftAlreadyStaked(_)
            | Self::MetadataNotFound(_) => ErrorKind::StateConflict,

            _ => ErrorKind::Policy,
        }
    }
}
