//! Role-based gating for administrative operations
//!
//! Each engine component owns a `Roles` registry seeded with an initial
//! admin. Admin entry points call `require` before any other validation, so
//! an unauthorized caller is rejected before the request is even inspected.

use crate::error::{EmberError, Result};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Administrative roles recognized by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May add, fund, retime, and remove reward flows
    FlowCreator,
    /// May configure the vault (power tables, exclusions, overrides, sweeps)
    VaultAdmin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowCreator => write!(f, "FLOW_CREATOR"),
            Self::VaultAdmin => write!(f, "VAULT_ADMIN"),
        }
    }
}

/// Role membership registry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Roles {
    members: HashMap<Role, HashSet<AccountId>>,
}

impl Roles {
    /// Create a registry with `admin` granted the given role
    pub fn with_admin(role: Role, admin: AccountId) -> Self {
        let mut roles = Self::default();
        roles.members.entry(role).or_default().insert(admin);
        roles
    }

    /// Check membership
    pub fn has(&self, role: Role, account: &AccountId) -> bool {
        self.members
            .get(&role)
            .map(|m| m.contains(account))
            .unwrap_or(false)
    }

    /// Fail with `MissingRole` unless `caller` holds `role`
    pub fn require(&self, role: Role, caller: &AccountId) -> Result<()> {
        if self.has(role, caller) {
            Ok(())
        } else {
            Err(EmberError::MissingRole(role))
        }
    }

    /// Grant `role` to `account`; the caller must already hold the role
    pub fn grant(&mut self, role: Role, caller: &AccountId, account: AccountId) -> Result<()> {
        self.require(role, caller)?;
        self.members.entry(role).or_default().insert(account);
        Ok(())
    }

    /// Revoke `role` from `account`; the caller must hold the role
    pub fn revoke(&mut self, role: Role, caller: &AccountId, account: &AccountId) -> Result<()> {
        self.require(role, caller)?;
        if let Some(m) = self.members.get_mut(&role) {
            m.remove(account);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_seeded() {
        let admin = AccountId::from_seed(b"admin");
        let roles = Roles::with_admin(Role::FlowCreator, admin);

        assert!(roles.has(Role::FlowCreator, &admin));
        assert!(!roles.has(Role::VaultAdmin, &admin));
    }

    #[test]
    fn test_grant_and_revoke() {
        let admin = AccountId::from_seed(b"admin");
        let other = AccountId::from_seed(b"other");
        let mut roles = Roles::with_admin(Role::VaultAdmin, admin);

        assert!(roles.require(Role::VaultAdmin, &other).is_err());
        roles.grant(Role::VaultAdmin, &admin, other).unwrap();
        assert!(roles.require(Role::VaultAdmin, &other).is_ok());

        roles.revoke(Role::VaultAdmin, &admin, &other).unwrap();
        assert!(!roles.has(Role::VaultAdmin, &other));
    }

    #[test]
    fn test_outsider_cannot_grant() {
        let admin = AccountId::from_seed(b"admin");
        let hacker = AccountId::from_seed(b"hacker");
        let mut roles = Roles::with_admin(Role::FlowCreator, admin);

        let err = roles.grant(Role::FlowCreator, &hacker, hacker).unwrap_err();
        assert_eq!(err, EmberError::MissingRole(Role::FlowCreator));
    }
}
