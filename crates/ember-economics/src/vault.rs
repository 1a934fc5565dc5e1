//! Staking vault
//!
//! Accepts essence deposits under lock tiers and NFT boosts, pulls settled
//! rewards from the flow ledger, and distributes them across staked power
//! with a global reward-per-power accumulator:
//!
//! ```text
//! acc += distributed * ONE / (total_ep_token + total_nft_power)
//! pending(position) = ep_amount * acc / ONE - reward_debt
//! ```
//!
//! Rewards pulled from the ledger are split by the utilization throttle;
//! the undistributed remainder pools up until an admin sweeps it. Principal
//! leaves through a timelock followed by linear vesting, both fixed by the
//! deposit's lock tier.

use ember_core::error::{EmberError, Result};
use ember_core::roles::{Role, Roles};
use ember_core::token::{StackableHandle, TokenHandle, UniqueHandle};
use ember_core::types::{AccountId, TokenId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::constants::{
    MAX_ARTIFACTS_PER_WALLET, MAX_DEPOSITS_PER_USER, MAX_ONE_OF_ONE_PER_WALLET,
    MAX_RODS_PER_WALLET, ONE,
};
use crate::flow::FlowLedger;
use crate::math::mul_div;
use crate::power::PowerOracle;
use crate::throttle::UtilizationCurve;
use crate::tiers::LockTier;

/// One essence deposit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub deposit_id: u64,
    /// Principal at deposit time
    pub original_amount: u128,
    /// Principal still in the vault
    pub remaining: u128,
    /// Boosted power; zeroed once the principal is fully withdrawn
    pub ep_amount: u128,
    pub lock: LockTier,
    pub deposit_timestamp: i64,
    /// Accumulator checkpoint: rewards below this are not owed
    pub reward_debt: u128,
    /// Rewards parked when the position lost its power
    pub pending_credit: u128,
    /// Set by the first successful withdrawal (zero-amount included)
    pub vesting_started: Option<i64>,
}

/// A stack of identical absorber rods staked by one wallet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RodStake {
    pub amount: u64,
    /// Total power of the stack, snapshotted at stake time
    pub power: u128,
}

/// One staked artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStake {
    pub token_id: TokenId,
    /// Power snapshotted at stake time
    pub power: u128,
    pub one_of_one: bool,
}

/// Per-wallet staking state
#[derive(Clone, Debug, Serialize, Deserialize)]
struct UserAccount {
    positions: IndexMap<u64, Position>,
    next_deposit_id: u64,
    total_deposited: u128,
    /// Combined rod and artifact power
    nft_power: u128,
    /// Accumulator checkpoint for the NFT power share
    power_debt: u128,
    /// NFT rewards settled when power changed, paid at next harvest
    power_credit: u128,
    rods: IndexMap<TokenId, RodStake>,
    artifacts: Vec<ArtifactStake>,
}

impl Default for UserAccount {
    fn default() -> Self {
        Self {
            positions: IndexMap::new(),
            next_deposit_id: 1,
            total_deposited: 0,
            nft_power: 0,
            power_debt: 0,
            power_credit: 0,
            rods: IndexMap::new(),
            artifacts: Vec::new(),
        }
    }
}

impl UserAccount {
    fn rods_staked(&self) -> u64 {
        self.rods.values().map(|stake| stake.amount).sum()
    }

    /// Park the accrued NFT share before `nft_power` changes
    fn checkpoint_power(&mut self, acc: u128) {
        self.power_credit += mul_div(self.nft_power, acc, ONE) - self.power_debt;
    }

    fn reset_power_debt(&mut self, acc: u128) {
        self.power_debt = mul_div(self.nft_power, acc, ONE);
    }
}

/// Essence staking vault
pub struct StakingVault {
    /// Vault token account; also its flow recipient in the ledger
    account: AccountId,
    essence: TokenHandle,
    rods: StackableHandle,
    artifacts: UniqueHandle,
    field: Arc<RwLock<FlowLedger>>,
    oracle: PowerOracle,
    curve: UtilizationCurve,
    roles: Roles,

    users: HashMap<AccountId, UserAccount>,
    staked_artifact_owner: HashMap<TokenId, AccountId>,
    excluded: Vec<AccountId>,

    total_ep_token: u128,
    total_nft_power: u128,
    essence_total_deposits: u128,
    acc_reward_per_power: u128,
    total_undistributed: u128,
    utilization_override: u128,
    unlock_all: bool,
}

impl StakingVault {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: AccountId,
        essence: TokenHandle,
        rods: StackableHandle,
        artifacts: UniqueHandle,
        field: Arc<RwLock<FlowLedger>>,
        oracle: PowerOracle,
        admin: AccountId,
    ) -> Self {
        Self {
            account,
            essence,
            rods,
            artifacts,
            field,
            oracle,
            curve: UtilizationCurve::default(),
            roles: Roles::with_admin(Role::VaultAdmin, admin),
            users: HashMap::new(),
            staked_artifact_owner: HashMap::new(),
            excluded: Vec::new(),
            total_ep_token: 0,
            total_nft_power: 0,
            essence_total_deposits: 0,
            acc_reward_per_power: 0,
            total_undistributed: 0,
            utilization_override: 0,
            unlock_all: false,
        }
    }

    // === Accrual ===

    /// Pull settled rewards from the ledger and fold them into the
    /// accumulator
    ///
    /// With zero staked power nothing is pulled, so the emission keeps
    /// accruing in the ledger until power exists to receive it.
    pub fn update_rewards(&mut self, now: i64) -> Result<()> {
        let total_power = self.total_ep_token + self.total_nft_power;
        if total_power == 0 {
            return Ok(());
        }
        let settled = self.field.write().settle(&self.account, now)?;
        if settled == 0 {
            return Ok(());
        }
        let (distributed, undistributed) = self.real_essence_reward(settled);
        self.total_undistributed += undistributed;
        self.acc_reward_per_power += mul_div(distributed, ONE, total_power);
        debug!(
            settled,
            distributed,
            acc = self.acc_reward_per_power,
            "rewards folded into accumulator"
        );
        Ok(())
    }

    /// Share of circulating essence locked in the vault, 1e18 fixed point
    ///
    /// Excluded addresses count on neither side: their wallet balances
    /// leave the circulating supply and their staked deposits leave the
    /// numerator. Circulating supply also excludes the vault's own
    /// undeposited balance (settled but unharvested rewards). A non-zero
    /// override replaces the computation entirely.
    pub fn utilization(&self) -> u128 {
        if self.utilization_override != 0 {
            return self.utilization_override;
        }
        let token = self.essence.read();
        let mut circulating = token.total_supply();
        let mut excluded_deposits = 0;
        for address in &self.excluded {
            circulating = circulating.saturating_sub(token.balance_of(address));
            excluded_deposits += self.users.get(address).map_or(0, |user| user.total_deposited);
        }
        let rewards_amount = token
            .balance_of(&self.account)
            .saturating_sub(self.essence_total_deposits);
        circulating = circulating.saturating_sub(rewards_amount);
        let counted = self.essence_total_deposits.saturating_sub(excluded_deposits);
        mul_div(counted, ONE, circulating)
    }

    /// Split a nominal reward into its distributed and undistributed parts
    /// at the current utilization
    pub fn real_essence_reward(&self, nominal: u128) -> (u128, u128) {
        let effectiveness = self.curve.effectiveness(self.utilization());
        let distributed = mul_div(nominal, effectiveness, ONE);
        (distributed, nominal - distributed)
    }

    // === Deposits ===

    /// Lock essence under a tier, opening a new position
    pub fn deposit(
        &mut self,
        owner: &AccountId,
        amount: u128,
        lock: LockTier,
        now: i64,
    ) -> Result<u64> {
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        if self.users.get(owner).map_or(0, |user| user.positions.len()) >= MAX_DEPOSITS_PER_USER {
            return Err(EmberError::MaxDepositsReached(MAX_DEPOSITS_PER_USER));
        }
        self.update_rewards(now)?;
        let account = self.account;
        self.essence.write().transfer(owner, &account, amount)?;

        let acc = self.acc_reward_per_power;
        let ep_amount = lock.effective_power(amount);
        let user = self.users.entry(*owner).or_default();
        let deposit_id = user.next_deposit_id;
        user.next_deposit_id += 1;
        user.total_deposited += amount;
        user.positions.insert(
            deposit_id,
            Position {
                deposit_id,
                original_amount: amount,
                remaining: amount,
                ep_amount,
                lock,
                deposit_timestamp: now,
                reward_debt: mul_div(ep_amount, acc, ONE),
                pending_credit: 0,
                vesting_started: None,
            },
        );
        self.total_ep_token += ep_amount;
        self.essence_total_deposits += amount;
        info!(owner = %owner, deposit_id, amount, tier = lock.name(), "deposit opened");
        Ok(deposit_id)
    }

    /// Withdraw vested principal from one position
    ///
    /// A zero amount is accepted and only starts the position's vesting
    /// clock. When the last principal leaves, the position's accrued
    /// rewards are parked as credit and its power is removed from the
    /// totals; the position itself survives until that credit is
    /// harvested.
    pub fn withdraw_position(
        &mut self,
        owner: &AccountId,
        deposit_id: u64,
        amount: u128,
        now: i64,
    ) -> Result<u128> {
        self.update_rewards(now)?;
        let acc = self.acc_reward_per_power;
        let account = self.account;
        self.validate_withdraw(owner, deposit_id, amount, now)?;

        if amount > 0 {
            self.essence.write().transfer(&account, owner, amount)?;
        }

        let mut removed_ep = 0;
        if let Some(user) = self.users.get_mut(owner) {
            let mut drop_position = false;
            if let Some(position) = user.positions.get_mut(&deposit_id) {
                if position.vesting_started.is_none() {
                    position.vesting_started = Some(now);
                }
                if amount > 0 {
                    position.remaining -= amount;
                    user.total_deposited -= amount;
                    if position.remaining == 0 {
                        position.pending_credit += mul_div(position.ep_amount, acc, ONE) - position.reward_debt;
                        removed_ep = position.ep_amount;
                        position.ep_amount = 0;
                        position.reward_debt = 0;
                        drop_position = position.pending_credit == 0;
                    }
                }
            }
            if drop_position {
                user.positions.shift_remove(&deposit_id);
            }
        }
        self.total_ep_token -= removed_ep;
        self.essence_total_deposits -= amount;
        debug!(owner = %owner, deposit_id, amount, "principal withdrawn");
        Ok(amount)
    }

    /// Withdraw whatever principal is currently available across all
    /// positions
    ///
    /// Fails only when every position is still inside its timelock.
    pub fn withdraw_all(&mut self, owner: &AccountId, now: i64) -> Result<u128> {
        self.update_rewards(now)?;
        let unlock_all = self.unlock_all;
        let user = self.users.get(owner).ok_or(EmberError::PositionNotFound {
            owner: *owner,
            deposit_id: 0,
        })?;

        let mut earliest_unlock = i64::MAX;
        let mut plan = Vec::new();
        for position in user.positions.values() {
            let unlocks_at = position.deposit_timestamp + position.lock.timelock();
            if !unlock_all && now < unlocks_at {
                earliest_unlock = earliest_unlock.min(unlocks_at);
                continue;
            }
            let available = Self::available_principal(position, unlock_all, now);
            plan.push((position.deposit_id, available));
        }
        if plan.is_empty() {
            return Err(EmberError::StillLocked {
                unlocks_at: earliest_unlock,
            });
        }
        let mut total = 0;
        for (deposit_id, available) in plan {
            total += self.withdraw_position(owner, deposit_id, available, now)?;
        }
        Ok(total)
    }

    // === Harvest ===

    /// Pay out one position's accrued rewards plus the wallet's NFT share
    pub fn harvest_position(&mut self, owner: &AccountId, deposit_id: u64, now: i64) -> Result<u128> {
        self.update_rewards(now)?;
        let acc = self.acc_reward_per_power;
        let account = self.account;

        let user = self.users.get(owner).ok_or(EmberError::PositionNotFound {
            owner: *owner,
            deposit_id,
        })?;
        let position = user
            .positions
            .get(&deposit_id)
            .ok_or(EmberError::PositionNotFound {
                owner: *owner,
                deposit_id,
            })?;
        let payout = mul_div(position.ep_amount, acc, ONE) - position.reward_debt
            + position.pending_credit
            + mul_div(user.nft_power, acc, ONE)
            - user.power_debt
            + user.power_credit;

        if payout > 0 {
            self.essence.write().transfer(&account, owner, payout)?;
        }

        if let Some(user) = self.users.get_mut(owner) {
            let mut drop_position = false;
            if let Some(position) = user.positions.get_mut(&deposit_id) {
                position.reward_debt = mul_div(position.ep_amount, acc, ONE);
                position.pending_credit = 0;
                drop_position = position.remaining == 0;
            }
            if drop_position {
                user.positions.shift_remove(&deposit_id);
            }
            user.reset_power_debt(acc);
            user.power_credit = 0;
        }
        debug!(owner = %owner, deposit_id, payout, "position harvested");
        Ok(payout)
    }

    /// Pay out everything the wallet has accrued
    pub fn harvest_all(&mut self, owner: &AccountId, now: i64) -> Result<u128> {
        self.update_rewards(now)?;
        let acc = self.acc_reward_per_power;
        let account = self.account;

        let Some(user) = self.users.get(owner) else {
            return Ok(0);
        };
        let mut payout = mul_div(user.nft_power, acc, ONE) - user.power_debt + user.power_credit;
        for position in user.positions.values() {
            payout += mul_div(position.ep_amount, acc, ONE) - position.reward_debt + position.pending_credit;
        }

        if payout > 0 {
            self.essence.write().transfer(&account, owner, payout)?;
        }

        if let Some(user) = self.users.get_mut(owner) {
            for position in user.positions.values_mut() {
                position.reward_debt = mul_div(position.ep_amount, acc, ONE);
                position.pending_credit = 0;
            }
            user.positions.retain(|_, position| position.remaining > 0);
            user.reset_power_debt(acc);
            user.power_credit = 0;
        }
        debug!(owner = %owner, payout, "wallet harvested");
        Ok(payout)
    }

    /// Harvest a position and withdraw principal from it in one call
    ///
    /// The withdrawal is validated before any payout, so a doomed request
    /// leaves both the rewards and the principal untouched.
    pub fn withdraw_and_harvest_position(
        &mut self,
        owner: &AccountId,
        deposit_id: u64,
        amount: u128,
        now: i64,
    ) -> Result<(u128, u128)> {
        self.update_rewards(now)?;
        self.validate_withdraw(owner, deposit_id, amount, now)?;
        let harvested = self.harvest_position(owner, deposit_id, now)?;
        // the harvest reaps an already-emptied position; only a zero-amount
        // request can pass validation in that state
        let withdrawn = if self.position(owner, deposit_id).is_some() {
            self.withdraw_position(owner, deposit_id, amount, now)?
        } else {
            0
        };
        Ok((withdrawn, harvested))
    }

    /// Withdraw whatever is available and harvest everything in one call
    pub fn withdraw_and_harvest_all(&mut self, owner: &AccountId, now: i64) -> Result<(u128, u128)> {
        let withdrawn = self.withdraw_all(owner, now)?;
        let harvested = self.harvest_all(owner, now)?;
        Ok((withdrawn, harvested))
    }

    // === NFT staking ===

    /// Stake a stack of absorber rods
    ///
    /// Per-unit power is snapshotted from the oracle at stake time, so a
    /// later table change leaves existing stakes untouched.
    pub fn stake_rod(
        &mut self,
        owner: &AccountId,
        token_id: TokenId,
        amount: u64,
        now: i64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        let staked = self.users.get(owner).map_or(0, UserAccount::rods_staked);
        if amount > MAX_RODS_PER_WALLET - staked {
            return Err(EmberError::MaxRodsExceeded {
                staked,
                cap: MAX_RODS_PER_WALLET,
            });
        }
        self.update_rewards(now)?;
        let account = self.account;
        self.rods.write().transfer(owner, &account, token_id, amount)?;

        let acc = self.acc_reward_per_power;
        let power = self.oracle.rod_stack_power(amount);
        let user = self.users.entry(*owner).or_default();
        user.checkpoint_power(acc);
        user.nft_power += power;
        user.reset_power_debt(acc);
        let stake = user.rods.entry(token_id).or_default();
        stake.amount += amount;
        stake.power += power;
        self.total_nft_power += power;
        info!(owner = %owner, token_id, amount, power, "rods staked");
        Ok(())
    }

    /// Return rods to their owner, removing a proportional slice of the
    /// stack's power
    pub fn unstake_rod(
        &mut self,
        owner: &AccountId,
        token_id: TokenId,
        amount: u64,
        now: i64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        let stake = self
            .users
            .get(owner)
            .and_then(|user| user.rods.get(&token_id))
            .copied()
            .ok_or(EmberError::NftNotStaked(token_id))?;
        if amount > stake.amount {
            return Err(EmberError::InsufficientStakedBalance {
                staked: stake.amount,
                requested: amount,
            });
        }
        self.update_rewards(now)?;
        let account = self.account;
        self.rods.write().transfer(&account, owner, token_id, amount)?;

        let acc = self.acc_reward_per_power;
        let removed_power = stake.power * amount as u128 / stake.amount as u128;
        if let Some(user) = self.users.get_mut(owner) {
            user.checkpoint_power(acc);
            user.nft_power -= removed_power;
            user.reset_power_debt(acc);
            if let Some(stake) = user.rods.get_mut(&token_id) {
                stake.amount -= amount;
                stake.power -= removed_power;
                if stake.amount == 0 {
                    user.rods.shift_remove(&token_id);
                }
            }
        }
        self.total_nft_power -= removed_power;
        info!(owner = %owner, token_id, amount, removed_power, "rods unstaked");
        Ok(())
    }

    /// Stake an artifact, snapshotting its oracle power
    pub fn stake_artifact(&mut self, owner: &AccountId, token_id: TokenId, now: i64) -> Result<()> {
        if self.staked_artifact_owner.contains_key(&token_id) {
            return Err(EmberError::NftAlreadyStaked(token_id));
        }
        if self.artifacts.read().owner_of(token_id) != Some(*owner) {
            return Err(EmberError::NotOwner(token_id));
        }
        let one_of_one = self.oracle.is_one_of_one(token_id)?;
        if let Some(user) = self.users.get(owner) {
            if user.artifacts.len() >= MAX_ARTIFACTS_PER_WALLET {
                return Err(EmberError::MaxArtifactsExceeded(MAX_ARTIFACTS_PER_WALLET));
            }
            let one_of_ones = user.artifacts.iter().filter(|a| a.one_of_one).count();
            if one_of_one && one_of_ones >= MAX_ONE_OF_ONE_PER_WALLET {
                return Err(EmberError::MaxOneOfOneExceeded);
            }
        }
        self.update_rewards(now)?;
        let account = self.account;
        let power = self.oracle.artifact_power(token_id)?;
        self.artifacts.write().transfer(owner, &account, token_id)?;

        let acc = self.acc_reward_per_power;
        let user = self.users.entry(*owner).or_default();
        user.checkpoint_power(acc);
        user.nft_power += power;
        user.reset_power_debt(acc);
        user.artifacts.push(ArtifactStake {
            token_id,
            power,
            one_of_one,
        });
        self.total_nft_power += power;
        self.staked_artifact_owner.insert(token_id, *owner);
        info!(owner = %owner, token_id, power, one_of_one, "artifact staked");
        Ok(())
    }

    /// Return an artifact to its staker
    pub fn unstake_artifact(&mut self, owner: &AccountId, token_id: TokenId, now: i64) -> Result<()> {
        if self.staked_artifact_owner.get(&token_id) != Some(owner) {
            return Err(EmberError::NftNotStaked(token_id));
        }
        self.update_rewards(now)?;
        let account = self.account;
        self.artifacts.write().transfer(&account, owner, token_id)?;

        let acc = self.acc_reward_per_power;
        let mut removed_power = 0;
        if let Some(user) = self.users.get_mut(owner) {
            if let Some(index) = user.artifacts.iter().position(|a| a.token_id == token_id) {
                removed_power = user.artifacts.remove(index).power;
            }
            user.checkpoint_power(acc);
            user.nft_power -= removed_power;
            user.reset_power_debt(acc);
        }
        self.total_nft_power -= removed_power;
        self.staked_artifact_owner.remove(&token_id);
        info!(owner = %owner, token_id, removed_power, "artifact unstaked");
        Ok(())
    }

    // === Administration ===

    /// Force a fixed utilization; zero restores the live computation
    pub fn set_utilization_override(&mut self, caller: &AccountId, value: u128) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        self.utilization_override = value;
        Ok(())
    }

    /// Emergency switch: every position becomes fully withdrawable
    pub fn set_unlock_all(&mut self, caller: &AccountId, unlock_all: bool) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        self.unlock_all = unlock_all;
        info!(unlock_all, "unlock override toggled");
        Ok(())
    }

    /// Replace the utilization curve
    pub fn set_curve(&mut self, caller: &AccountId, curve: UtilizationCurve) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        self.curve = curve;
        Ok(())
    }

    /// Edit one artifact power table entry; affects future stakes only
    pub fn set_artifact_power(
        &mut self,
        caller: &AccountId,
        generation: u8,
        rarity: u8,
        power: u128,
    ) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        self.oracle.set_power(generation, rarity, power)
    }

    /// Replace the per-unit rod power; affects future stakes only
    pub fn set_rod_power(&mut self, caller: &AccountId, power: u128) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        self.oracle.set_rod_power(power);
        Ok(())
    }

    /// Exclude an address from the circulating supply
    pub fn add_excluded(&mut self, caller: &AccountId, address: AccountId) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        if self.excluded.contains(&address) {
            return Err(EmberError::AlreadyExcluded(address));
        }
        self.excluded.push(address);
        Ok(())
    }

    /// Remove an address from the exclusion list (order not preserved)
    pub fn remove_excluded(&mut self, caller: &AccountId, address: &AccountId) -> Result<()> {
        self.roles.require(Role::VaultAdmin, caller)?;
        let index = self
            .excluded
            .iter()
            .position(|entry| entry == address)
            .ok_or(EmberError::NotExcluded(*address))?;
        self.excluded.swap_remove(index);
        Ok(())
    }

    /// Sweep the pooled undistributed rewards to a target account
    pub fn withdraw_undistributed(&mut self, caller: &AccountId, to: &AccountId) -> Result<u128> {
        self.roles.require(Role::VaultAdmin, caller)?;
        let amount = self.total_undistributed;
        if amount == 0 {
            return Ok(0);
        }
        let account = self.account;
        self.essence.write().transfer(&account, to, amount)?;
        self.total_undistributed = 0;
        info!(to = %to, amount, "undistributed rewards swept");
        Ok(amount)
    }

    // === Queries ===

    /// Rewards a position would pay if harvested at `now`, including the
    /// wallet's NFT share
    pub fn pending_rewards_position(&self, owner: &AccountId, deposit_id: u64, now: i64) -> u128 {
        let acc = self.projected_acc(now);
        let Some(user) = self.users.get(owner) else {
            return 0;
        };
        let Some(position) = user.positions.get(&deposit_id) else {
            return 0;
        };
        mul_div(position.ep_amount, acc, ONE) - position.reward_debt
            + position.pending_credit
            + mul_div(user.nft_power, acc, ONE)
            - user.power_debt
            + user.power_credit
    }

    /// Rewards a full harvest would pay at `now`
    pub fn pending_rewards_all(&self, owner: &AccountId, now: i64) -> u128 {
        let acc = self.projected_acc(now);
        let Some(user) = self.users.get(owner) else {
            return 0;
        };
        let mut pending = mul_div(user.nft_power, acc, ONE) - user.power_debt + user.power_credit;
        for position in user.positions.values() {
            pending += mul_div(position.ep_amount, acc, ONE) - position.reward_debt + position.pending_credit;
        }
        pending
    }

    /// Principal vested and not yet withdrawn, as reported to clients
    ///
    /// Inside the linear window this reads zero until the position's
    /// vesting clock has been started by a withdrawal.
    pub fn calculate_vested_principal(&self, owner: &AccountId, deposit_id: u64, now: i64) -> u128 {
        let Some(position) = self
            .users
            .get(owner)
            .and_then(|user| user.positions.get(&deposit_id))
        else {
            return 0;
        };
        if self.unlock_all {
            return position.remaining;
        }
        let lock_end = position.deposit_timestamp + position.lock.timelock();
        let vesting = position.lock.vesting_time();
        if now < lock_end {
            return 0;
        }
        if vesting == 0 || now >= lock_end + vesting {
            return position.remaining;
        }
        if position.vesting_started.is_none() {
            return 0;
        }
        let withdrawn = position.original_amount - position.remaining;
        let vested = mul_div(position.original_amount, (now - lock_end) as u128, vesting as u128);
        vested.saturating_sub(withdrawn)
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    pub fn position(&self, owner: &AccountId, deposit_id: u64) -> Option<&Position> {
        self.users.get(owner)?.positions.get(&deposit_id)
    }

    /// Open deposit ids for a wallet, in creation order
    pub fn deposit_ids(&self, owner: &AccountId) -> Vec<u64> {
        self.users
            .get(owner)
            .map(|user| user.positions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Rod stack a wallet has staked under one token id
    pub fn rod_stake(&self, owner: &AccountId, token_id: TokenId) -> Option<RodStake> {
        self.users.get(owner)?.rods.get(&token_id).copied()
    }

    /// Artifacts a wallet has staked, in stake order
    pub fn artifact_stakes(&self, owner: &AccountId) -> Vec<ArtifactStake> {
        self.users
            .get(owner)
            .map(|user| user.artifacts.clone())
            .unwrap_or_default()
    }

    pub fn total_deposited(&self, owner: &AccountId) -> u128 {
        self.users.get(owner).map_or(0, |user| user.total_deposited)
    }

    pub fn nft_power(&self, owner: &AccountId) -> u128 {
        self.users.get(owner).map_or(0, |user| user.nft_power)
    }

    pub fn total_ep_token(&self) -> u128 {
        self.total_ep_token
    }

    pub fn total_nft_power(&self) -> u128 {
        self.total_nft_power
    }

    pub fn essence_total_deposits(&self) -> u128 {
        self.essence_total_deposits
    }

    pub fn acc_reward_per_power(&self) -> u128 {
        self.acc_reward_per_power
    }

    pub fn total_undistributed(&self) -> u128 {
        self.total_undistributed
    }

    pub fn excluded(&self) -> &[AccountId] {
        &self.excluded
    }

    pub fn oracle(&self) -> &PowerOracle {
        &self.oracle
    }

    fn validate_withdraw(
        &self,
        owner: &AccountId,
        deposit_id: u64,
        amount: u128,
        now: i64,
    ) -> Result<()> {
        let position = self
            .users
            .get(owner)
            .and_then(|user| user.positions.get(&deposit_id))
            .ok_or(EmberError::PositionNotFound {
                owner: *owner,
                deposit_id,
            })?;
        let unlocks_at = position.deposit_timestamp + position.lock.timelock();
        if !self.unlock_all && now < unlocks_at {
            return Err(EmberError::StillLocked { unlocks_at });
        }
        if amount > position.remaining {
            return Err(EmberError::WithdrawTooBig {
                remaining: position.remaining,
                requested: amount,
            });
        }
        let available = Self::available_principal(position, self.unlock_all, now);
        if amount > available {
            return Err(EmberError::NotVested {
                vested: available,
                requested: amount,
            });
        }
        Ok(())
    }

    // Availability used by withdrawals: linear vesting anchored at the
    // lock end, net of principal already withdrawn.
    fn available_principal(position: &Position, unlock_all: bool, now: i64) -> u128 {
        if unlock_all {
            return position.remaining;
        }
        let lock_end = position.deposit_timestamp + position.lock.timelock();
        let vesting = position.lock.vesting_time();
        let vested = if now < lock_end {
            0
        } else if vesting == 0 || now >= lock_end + vesting {
            position.original_amount
        } else {
            mul_div(position.original_amount, (now - lock_end) as u128, vesting as u128)
        };
        let withdrawn = position.original_amount - position.remaining;
        vested.saturating_sub(withdrawn)
    }

    fn projected_acc(&self, now: i64) -> u128 {
        let total_power = self.total_ep_token + self.total_nft_power;
        if total_power == 0 {
            return self.acc_reward_per_power;
        }
        let pending = self.field.read().pending_rewards(&self.account, now);
        if pending == 0 {
            return self.acc_reward_per_power;
        }
        let distributed = mul_div(pending, self.curve.effectiveness(self.utilization()), ONE);
        self.acc_reward_per_power + mul_div(distributed, ONE, total_power)
    }
}

impl std::fmt::Debug for StakingVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingVault")
            .field("account", &self.account)
            .field("total_ep_token", &self.total_ep_token)
            .field("total_nft_power", &self.total_nft_power)
            .field("essence_total_deposits", &self.essence_total_deposits)
            .field("acc_reward_per_power", &self.acc_reward_per_power)
            .finish()
    }
}
