//! Lock tier table
//!
//! Each deposit commits to one of five lock tiers. A tier fixes the power
//! boost applied on top of the principal, the timelock before any
//! principal can leave, and the linear vesting window that begins when the
//! timelock expires.

use ember_core::error::{EmberError, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{DAY, ONE};
use crate::math::mul_div;

/// Deposit lock commitment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockTier {
    TwoWeeks,
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl LockTier {
    /// All tiers, in index order
    pub const ALL: [LockTier; 5] = [
        LockTier::TwoWeeks,
        LockTier::OneMonth,
        LockTier::ThreeMonths,
        LockTier::SixMonths,
        LockTier::TwelveMonths,
    ];

    /// Resolve a tier from its wire index
    pub fn from_index(index: u8) -> Result<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(EmberError::InvalidLockTier(index))
    }

    /// Wire index of this tier
    pub fn index(&self) -> u8 {
        match self {
            LockTier::TwoWeeks => 0,
            LockTier::OneMonth => 1,
            LockTier::ThreeMonths => 2,
            LockTier::SixMonths => 3,
            LockTier::TwelveMonths => 4,
        }
    }

    /// Power boost in 1e18 fixed point (0.1 = 10% extra power)
    pub fn power(&self) -> u128 {
        match self {
            LockTier::TwoWeeks => ONE / 10,
            LockTier::OneMonth => ONE / 4,
            LockTier::ThreeMonths => ONE * 8 / 10,
            LockTier::SixMonths => ONE * 18 / 10,
            LockTier::TwelveMonths => ONE * 4,
        }
    }

    /// Seconds before any principal may leave the deposit
    pub fn timelock(&self) -> i64 {
        match self {
            LockTier::TwoWeeks => 14 * DAY,
            LockTier::OneMonth => 30 * DAY,
            LockTier::ThreeMonths => 90 * DAY,
            LockTier::SixMonths => 180 * DAY,
            LockTier::TwelveMonths => 365 * DAY,
        }
    }

    /// Linear vesting window that follows the timelock
    pub fn vesting_time(&self) -> i64 {
        match self {
            LockTier::TwoWeeks => 0,
            LockTier::OneMonth => 7 * DAY,
            LockTier::ThreeMonths => 14 * DAY,
            LockTier::SixMonths => 30 * DAY,
            LockTier::TwelveMonths => 45 * DAY,
        }
    }

    /// Boosted deposit power: amount + amount * power
    pub fn effective_power(&self, amount: u128) -> u128 {
        amount + mul_div(amount, self.power(), ONE)
    }

    /// Human-readable tier name
    pub fn name(&self) -> &'static str {
        match self {
            LockTier::TwoWeeks => "two_weeks",
            LockTier::OneMonth => "one_month",
            LockTier::ThreeMonths => "three_months",
            LockTier::SixMonths => "six_months",
            LockTier::TwelveMonths => "twelve_months",
        }
    }
}
