//! Flow ledger
//!
//! Streams essence budgets to consumer accounts at a linear rate. Each
//! flow is a budget over a `[start, end)` window; settlement pays out
//! `rate_per_second * elapsed` since the last settlement, clamped to the
//! window. Funding, defunding, and retiming do not settle first; they
//! respread the unpaid remainder over the seconds left after the last
//! settlement, which retroactively reprices the unsettled span.

use ember_core::error::{EmberError, Result};
use ember_core::roles::{Role, Roles};
use ember_core::token::TokenHandle;
use ember_core::types::AccountId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Settlement notification hook
///
/// Consumers that want to react to settled rewards register one of these.
/// Delivery is best effort: a failing callback is logged and the
/// settlement still commits.
pub trait FlowCallback: Send + Sync {
    fn on_rewards_settled(&mut self, amount: u128, timestamp: i64) -> Result<()>;
}

/// One emission flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Budget committed to this flow
    pub total_rewards: u128,
    /// Rewards already settled out
    pub paid: u128,
    /// Emission window start
    pub start: i64,
    /// Emission window end
    pub end: i64,
    /// Upper bound of the last settled span
    pub last_reward_timestamp: i64,
    /// Current linear rate
    pub rate_per_second: u128,
    /// Whether settlements notify a registered callback
    pub callback_enabled: bool,
}

impl FlowConfig {
    /// Unsettled remainder of the budget
    pub fn unpaid(&self) -> u128 {
        self.total_rewards - self.paid
    }

    fn respread(&mut self) {
        self.rate_per_second = if self.end > self.last_reward_timestamp {
            self.unpaid() / (self.end - self.last_reward_timestamp) as u128
        } else {
            0
        };
    }
}

/// Registry of emission flows backed by a treasury token account
pub struct FlowLedger {
    /// Treasury account the settled essence leaves from
    account: AccountId,
    essence: TokenHandle,
    flows: IndexMap<AccountId, FlowConfig>,
    callbacks: HashMap<AccountId, Box<dyn FlowCallback>>,
    roles: Roles,
}

impl FlowLedger {
    pub fn new(account: AccountId, essence: TokenHandle, admin: AccountId) -> Self {
        Self {
            account,
            essence,
            flows: IndexMap::new(),
            callbacks: HashMap::new(),
            roles: Roles::with_admin(Role::FlowCreator, admin),
        }
    }

    /// Treasury account
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Access control table
    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    /// Register a new flow
    pub fn add_flow(
        &mut self,
        caller: &AccountId,
        flow: AccountId,
        total_rewards: u128,
        start: i64,
        end: i64,
        callback_enabled: bool,
    ) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        if self.flows.contains_key(&flow) {
            return Err(EmberError::FlowExists(flow));
        }
        if end <= start {
            return Err(EmberError::InvalidTimeWindow { start, end });
        }
        if total_rewards == 0 {
            return Err(EmberError::ZeroRewards);
        }
        let config = FlowConfig {
            total_rewards,
            paid: 0,
            start,
            end,
            last_reward_timestamp: start,
            rate_per_second: total_rewards / (end - start) as u128,
            callback_enabled,
        };
        info!(
            flow = %flow,
            total = total_rewards,
            start,
            end,
            rate = config.rate_per_second,
            "flow added"
        );
        self.flows.insert(flow, config);
        Ok(())
    }

    /// Register a settlement callback for a flow
    pub fn set_callback(&mut self, flow: AccountId, callback: Box<dyn FlowCallback>) {
        self.callbacks.insert(flow, callback);
    }

    /// Settle a flow up to `now` and transfer the payout to its account
    ///
    /// Unknown or removed flows settle to zero rather than failing, so
    /// consumers can call this unconditionally.
    pub fn settle(&mut self, flow: &AccountId, now: i64) -> Result<u128> {
        let Some(config) = self.flows.get(flow) else {
            return Ok(0);
        };
        if now <= config.last_reward_timestamp || config.last_reward_timestamp >= config.end {
            return Ok(0);
        }
        let until = now.min(config.end);
        let pending = config.rate_per_second * (until - config.last_reward_timestamp) as u128;
        let notify = config.callback_enabled;
        if pending > 0 {
            self.essence.write().transfer(&self.account, flow, pending)?;
        }
        if let Some(config) = self.flows.get_mut(flow) {
            config.last_reward_timestamp = until;
            config.paid += pending;
        }
        if pending == 0 {
            return Ok(0);
        }
        debug!(flow = %flow, pending, until, "flow settled");
        if notify {
            if let Some(callback) = self.callbacks.get_mut(flow) {
                if let Err(err) = callback.on_rewards_settled(pending, now) {
                    warn!(flow = %flow, %err, "settlement callback failed");
                }
            }
        }
        Ok(pending)
    }

    /// Grow a flow budget, pulling the tokens from the caller
    ///
    /// The unsettled remainder is respread over the seconds left, so the
    /// span since the last settlement is repriced at the new rate.
    pub fn fund_flow(&mut self, caller: &AccountId, flow: &AccountId, amount: u128) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        let account = self.account;
        if !self.flows.contains_key(flow) {
            return Err(EmberError::FlowNotFound(*flow));
        }
        self.essence.write().transfer(caller, &account, amount)?;
        let mut rate = 0;
        if let Some(config) = self.flows.get_mut(flow) {
            config.total_rewards += amount;
            config.respread();
            rate = config.rate_per_second;
        }
        info!(flow = %flow, amount, rate, "flow funded");
        Ok(())
    }

    /// Shrink a flow budget, returning the tokens to the caller
    pub fn defund_flow(&mut self, caller: &AccountId, flow: &AccountId, amount: u128) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        let account = self.account;
        let unpaid = self
            .flows
            .get(flow)
            .ok_or(EmberError::FlowNotFound(*flow))?
            .unpaid();
        if amount > unpaid {
            return Err(EmberError::DefundTooBig {
                unpaid,
                requested: amount,
            });
        }
        self.essence.write().transfer(&account, caller, amount)?;
        let mut rate = 0;
        if let Some(config) = self.flows.get_mut(flow) {
            config.total_rewards -= amount;
            config.respread();
            rate = config.rate_per_second;
        }
        info!(flow = %flow, amount, rate, "flow defunded");
        Ok(())
    }

    /// Donate tokens into an existing flow, open to any account
    pub fn grant_to_flow(&mut self, from: &AccountId, flow: &AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(EmberError::ZeroAmount);
        }
        let account = self.account;
        if !self.flows.contains_key(flow) {
            return Err(EmberError::FlowNotFound(*flow));
        }
        self.essence.write().transfer(from, &account, amount)?;
        if let Some(config) = self.flows.get_mut(flow) {
            config.total_rewards += amount;
            config.respread();
        }
        debug!(flow = %flow, from = %from, amount, "flow granted");
        Ok(())
    }

    /// Move a flow window; a zero argument leaves that bound unchanged
    ///
    /// The settlement cursor never moves backwards: pulling the start
    /// forward past it re-anchors the cursor at the new start.
    pub fn update_flow_time(
        &mut self,
        caller: &AccountId,
        flow: &AccountId,
        new_start: i64,
        new_end: i64,
    ) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        let config = self.flows.get_mut(flow).ok_or(EmberError::FlowNotFound(*flow))?;
        let start = if new_start != 0 { new_start } else { config.start };
        let end = if new_end != 0 { new_end } else { config.end };
        if end <= start {
            return Err(EmberError::InvalidTimeWindow { start, end });
        }
        config.start = start;
        config.end = end;
        config.last_reward_timestamp = config.last_reward_timestamp.max(start);
        config.respread();
        info!(flow = %flow, start, end, rate = config.rate_per_second, "flow retimed");
        Ok(())
    }

    /// Settle and delete a flow
    pub fn remove_flow(&mut self, caller: &AccountId, flow: &AccountId, now: i64) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        if !self.flows.contains_key(flow) {
            return Err(EmberError::FlowNotFound(*flow));
        }
        self.settle(flow, now)?;
        self.flows.shift_remove(flow);
        info!(flow = %flow, "flow removed");
        Ok(())
    }

    /// Withdraw treasury balance not earmarked by any flow
    pub fn withdraw_unearmarked(
        &mut self,
        caller: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<()> {
        self.roles.require(Role::FlowCreator, caller)?;
        let earmarked: u128 = self.flows.values().map(FlowConfig::unpaid).sum();
        let balance = self.essence.read().balance_of(&self.account);
        let available = balance.saturating_sub(earmarked);
        if amount > available {
            return Err(EmberError::InsufficientUnearmarked {
                available,
                requested: amount,
            });
        }
        self.essence.write().transfer(&self.account, to, amount)?;
        info!(to = %to, amount, "unearmarked essence withdrawn");
        Ok(())
    }

    /// Flow configuration, if registered
    pub fn flow(&self, flow: &AccountId) -> Option<&FlowConfig> {
        self.flows.get(flow)
    }

    /// All registered flows, in insertion order
    pub fn flows(&self) -> impl Iterator<Item = (&AccountId, &FlowConfig)> {
        self.flows.iter()
    }

    /// Settlement still owed to a flow at `now`, without mutating
    pub fn pending_rewards(&self, flow: &AccountId, now: i64) -> u128 {
        let Some(config) = self.flows.get(flow) else {
            return 0;
        };
        if now <= config.last_reward_timestamp || config.last_reward_timestamp >= config.end {
            return 0;
        }
        let until = now.min(config.end);
        config.rate_per_second * (until - config.last_reward_timestamp) as u128
    }

    /// Rate of one flow, zero outside its open window
    pub fn rate_per_second(&self, flow: &AccountId, now: i64) -> u128 {
        match self.flows.get(flow) {
            Some(config) if config.start < now && now < config.end => config.rate_per_second,
            _ => 0,
        }
    }

    /// Combined rate of all currently-open flows
    pub fn global_rate_per_second(&self, now: i64) -> u128 {
        self.flows
            .iter()
            .map(|(flow, _)| self.rate_per_second(flow, now))
            .sum()
    }
}

impl std::fmt::Debug for FlowLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowLedger")
            .field("account", &self.account)
            .field("flows", &self.flows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE;
    use ember_core::token::{FungibleToken, MemoryToken};

    fn setup(treasury_balance: u128) -> (FlowLedger, TokenHandle, AccountId) {
        let admin = AccountId::from_seed(b"admin");
        let treasury = AccountId::from_seed(b"treasury");
        let mut token = MemoryToken::new();
        token.mint(&treasury, treasury_balance);
        let handle = token.into_handle();
        let ledger = FlowLedger::new(treasury, handle.clone(), admin);
        (ledger, handle, admin)
    }

    #[test]
    fn test_add_flow_validation() {
        let (mut ledger, _token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        let outsider = AccountId::from_seed(b"outsider");

        assert!(matches!(
            ledger.add_flow(&outsider, flow, 100 * ONE, 0, 100, false),
            Err(EmberError::MissingRole(Role::FlowCreator))
        ));
        assert!(matches!(
            ledger.add_flow(&admin, flow, 100 * ONE, 100, 100, false),
            Err(EmberError::InvalidTimeWindow { .. })
        ));
        assert!(matches!(
            ledger.add_flow(&admin, flow, 0, 0, 100, false),
            Err(EmberError::ZeroRewards)
        ));

        ledger.add_flow(&admin, flow, 100 * ONE, 0, 100, false).unwrap();
        assert!(matches!(
            ledger.add_flow(&admin, flow, 100 * ONE, 0, 100, false),
            Err(EmberError::FlowExists(_))
        ));

        let config = ledger.flow(&flow).unwrap();
        assert_eq!(config.rate_per_second, ONE);
        assert_eq!(config.last_reward_timestamp, 0);
        assert_eq!(config.paid, 0);
    }

    #[test]
    fn test_settle_clamps_to_window() {
        let (mut ledger, token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 900 * ONE, 0, 5_000, false).unwrap();
        // 900e18 / 5000s
        assert_eq!(ledger.flow(&flow).unwrap().rate_per_second, 180_000_000_000_000_000);

        assert_eq!(ledger.settle(&flow, 500).unwrap(), 90 * ONE);
        assert_eq!(token.read().balance_of(&flow), 90 * ONE);
        // settling the same instant again pays nothing
        assert_eq!(ledger.settle(&flow, 500).unwrap(), 0);

        // past the end the payout clamps to the remaining budget
        assert_eq!(ledger.settle(&flow, 9_000).unwrap(), 810 * ONE);
        assert_eq!(ledger.flow(&flow).unwrap().paid, 900 * ONE);
        assert_eq!(ledger.settle(&flow, 10_000).unwrap(), 0);
    }

    #[test]
    fn test_settle_unknown_flow_is_noop() {
        let (mut ledger, _token, _admin) = setup(0);
        let ghost = AccountId::from_seed(b"ghost");
        assert_eq!(ledger.settle(&ghost, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_fund_respreads_unpaid_over_remaining_window() {
        let (mut ledger, _token, admin) = setup(10_000 * ONE);
        let funder = AccountId::from_seed(b"funder");
        ledger.roles_mut().grant(Role::FlowCreator, &admin, funder).unwrap();
        {
            let mut token = ledger.essence.write();
            token.mint(&funder, 100 * ONE);
        }

        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 25 * ONE, 100, 1_100, false).unwrap();
        ledger.settle(&flow, 400).unwrap();
        // unpaid 17.5e18 + 5.5e18 over 700s
        ledger.fund_flow(&funder, &flow, 5_500_000_000_000_000_000).unwrap();
        assert_eq!(ledger.flow(&flow).unwrap().rate_per_second, 32_857_142_857_142_857);
        assert_eq!(ledger.flow(&flow).unwrap().total_rewards, 30_500_000_000_000_000_000);
    }

    #[test]
    fn test_defund_respreads_and_bounds() {
        let (mut ledger, token, admin) = setup(10_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 5_000 * ONE, 200, 4_200, false).unwrap();
        ledger.settle(&flow, 1_000).unwrap();
        assert_eq!(ledger.flow(&flow).unwrap().paid, 1_000 * ONE);

        ledger.defund_flow(&admin, &flow, 1_250 * ONE).unwrap();
        // unpaid 2750e18 over 3200s
        assert_eq!(ledger.flow(&flow).unwrap().rate_per_second, 859_375_000_000_000_000);
        assert_eq!(token.read().balance_of(&admin), 1_250 * ONE);

        assert!(matches!(
            ledger.defund_flow(&admin, &flow, 5_000 * ONE),
            Err(EmberError::DefundTooBig { .. })
        ));
    }

    #[test]
    fn test_retime_sequence() {
        let (mut ledger, _token, admin) = setup(100_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 3_500 * ONE, 0, 3_200, false).unwrap();
        assert_eq!(ledger.flow(&flow).unwrap().rate_per_second, 1_093_750_000_000_000_000);

        ledger.settle(&flow, 571).unwrap();
        let paid_1 = ledger.flow(&flow).unwrap().paid;
        assert_eq!(paid_1, 624_531_250_000_000_000_000);

        // extend the end only
        ledger.update_flow_time(&admin, &flow, 0, 4_600).unwrap();
        let config = *ledger.flow(&flow).unwrap();
        assert_eq!(config.start, 0);
        assert_eq!(config.end, 4_600);
        assert_eq!(config.last_reward_timestamp, 571);
        assert_eq!(config.rate_per_second, (config.total_rewards - paid_1) / 4_029);

        // moving the start past the cursor re-anchors it
        ledger.update_flow_time(&admin, &flow, 800, 0).unwrap();
        assert_eq!(ledger.flow(&flow).unwrap().last_reward_timestamp, 800);

        assert!(matches!(
            ledger.update_flow_time(&admin, &flow, 900, 900),
            Err(EmberError::InvalidTimeWindow { .. })
        ));
    }

    #[test]
    fn test_rate_queries_respect_open_window() {
        let (mut ledger, _token, admin) = setup(10_000 * ONE);
        let a = AccountId::from_seed(b"flow-a");
        let b = AccountId::from_seed(b"flow-b");
        ledger.add_flow(&admin, a, 1_000 * ONE, 100, 1_100, false).unwrap();
        ledger.add_flow(&admin, b, 500 * ONE, 100, 600, false).unwrap();

        assert_eq!(ledger.rate_per_second(&a, 50), 0);
        assert_eq!(ledger.rate_per_second(&a, 100), 0);
        assert_eq!(ledger.rate_per_second(&a, 500), ONE);
        assert_eq!(ledger.rate_per_second(&a, 1_100), 0);
        assert_eq!(ledger.global_rate_per_second(500), 2 * ONE);
        assert_eq!(ledger.global_rate_per_second(700), ONE);
    }

    #[test]
    fn test_remove_flow_settles_then_forgets() {
        let (mut ledger, token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 100 * ONE, 0, 100, false).unwrap();
        ledger.remove_flow(&admin, &flow, 40).unwrap();
        assert_eq!(token.read().balance_of(&flow), 40 * ONE);
        assert!(ledger.flow(&flow).is_none());
        // further settles are silent no-ops
        assert_eq!(ledger.settle(&flow, 90).unwrap(), 0);
        assert!(matches!(
            ledger.remove_flow(&admin, &flow, 90),
            Err(EmberError::FlowNotFound(_))
        ));
    }

    #[test]
    fn test_withdraw_unearmarked_enforces_earmark() {
        let (mut ledger, token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        let sink = AccountId::from_seed(b"sink");
        ledger.add_flow(&admin, flow, 900 * ONE, 0, 100, false).unwrap();

        assert!(matches!(
            ledger.withdraw_unearmarked(&admin, &sink, 200 * ONE),
            Err(EmberError::InsufficientUnearmarked { .. })
        ));
        ledger.withdraw_unearmarked(&admin, &sink, 100 * ONE).unwrap();
        assert_eq!(token.read().balance_of(&sink), 100 * ONE);

        // settlement frees nothing: paid budget already left the treasury
        ledger.settle(&flow, 50).unwrap();
        assert!(matches!(
            ledger.withdraw_unearmarked(&admin, &sink, 1),
            Err(EmberError::InsufficientUnearmarked { .. })
        ));
    }

    struct Recorder {
        seen: std::sync::Arc<parking_lot::Mutex<Vec<(u128, i64)>>>,
        fail: bool,
    }

    impl FlowCallback for Recorder {
        fn on_rewards_settled(&mut self, amount: u128, timestamp: i64) -> Result<()> {
            self.seen.lock().push((amount, timestamp));
            if self.fail {
                return Err(EmberError::ZeroAmount);
            }
            Ok(())
        }
    }

    #[test]
    fn test_flow_config_snapshot_roundtrip() {
        let (mut ledger, _token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 900 * ONE, 0, 5_000, false).unwrap();
        ledger.settle(&flow, 500).unwrap();

        let config = *ledger.flow(&flow).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: FlowConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
        assert_eq!(restored.unpaid(), 810 * ONE);
    }

    #[test]
    fn test_callback_is_best_effort() {
        let (mut ledger, _token, admin) = setup(1_000 * ONE);
        let flow = AccountId::from_seed(b"flow");
        ledger.add_flow(&admin, flow, 100 * ONE, 0, 100, true).unwrap();

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        ledger.set_callback(flow, Box::new(Recorder { seen: seen.clone(), fail: true }));

        // callback failure does not poison the settlement
        assert_eq!(ledger.settle(&flow, 30).unwrap(), 30 * ONE);
        assert_eq!(seen.lock().as_slice(), &[(30 * ONE, 30)]);
        assert_eq!(ledger.flow(&flow).unwrap().paid, 30 * ONE);
    }
}
