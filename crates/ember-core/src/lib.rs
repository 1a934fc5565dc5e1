//! # Ember Core
//!
//! Foundation types for the Ember essence economy engine.
//!
//! This crate provides the building blocks shared by the economic components:
//! - `AccountId` / `TokenId` - participant and NFT identifiers
//! - `EmberError` - the engine-wide error taxonomy
//! - `Roles` - role-based gating for administrative operations
//! - Capability traits for the external collaborators the engine calls into
//!   (fungible essence token, stackable and unique NFT collections, artifact
//!   metadata), plus in-memory reference implementations for simulation and
//!   tests.
//!
//! ## Architecture
//!
//! The engine itself lives in `ember-economics` and is a set of deterministic
//! state machines: every time-dependent call takes an explicit `timestamp`
//! supplied by the execution environment, and external token movement goes
//! through the capability traits defined here.
//!
//! ```text
//!          ┌───────────────────────────────────────────────┐
//!          │              ember-economics                  │
//!          │   FlowLedger ──► StakingVault ──► PowerOracle │
//!          └───────┬───────────────┬───────────────┬───────┘
//!                  │               │               │
//!          ┌───────▼───────────────▼───────────────▼───────┐
//!          │  FungibleToken   StackableCollection   ...    │
//!          │            (capability traits, here)          │
//!          └───────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod roles;
pub mod token;
pub mod types;

pub use error::*;
pub use roles::*;
pub use token::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{EmberError, ErrorKind, Result};
    pub use crate::roles::{Role, Roles};
    pub use crate::token::{
        ArtifactMetadata, ArtifactMetadataSource, FungibleToken, MetadataHandle, StackableHandle,
        StackableCollection, TokenHandle, UniqueCollection, UniqueHandle,
    };
    pub use crate::types::{AccountId, TokenId};
}
