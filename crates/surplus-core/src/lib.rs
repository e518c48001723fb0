//! # Surplus Core
//!
//! Deterministic rules for the Surplus marketplace front end.
//!
//! This crate decides, it does not perform I/O over the network:
//! - [`routes`] classifies request paths (public, protected, role-scoped)
//! - [`gate`] turns a path plus an optional [`Session`] into allow/redirect
//! - [`verification`] and [`wizard`] model the multi-step supplier
//!   verification form and its state machine
//! - [`autosave`] tracks draft save generations and the retry backoff
//! - [`cart`] holds the buyer cart
//! - [`storage`] abstracts client-side persistence behind [`KeyValueStore`]
//!
//! ## Design Principles
//!
//! - All maps are `BTreeMap`/`BTreeSet` for deterministic ordering
//! - No floating-point arithmetic (prices are integer cents)
//! - Integer unix-second timestamps, passed in by the caller

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod autosave;
pub mod cart;
pub mod draft;
pub mod gate;
pub mod routes;
pub mod session;
pub mod storage;
pub mod verification;
pub mod wizard;

pub use autosave::{AutosaveStatus, AutosaveTracker, Backoff};
pub use cart::{Cart, CartError, CartLine};
pub use draft::{SaveDraftRequest, VerificationDraft};
pub use gate::{AccessGate, Decision, GateConfig, InactiveRolePolicy};
pub use routes::{RouteClass, RouteTable, canonical_path};
pub use session::{Session, SessionContext, SessionError};
pub use storage::{KeyValueStore, MemoryStore, RedbStore, StoreError};
pub use verification::{FieldError, Step, StepData, ValidationErrors};
pub use wizard::{Phase, Transition, Wizard, WizardError};

/// Unix timestamp in whole seconds.
pub type Timestamp = u64;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a marketplace user, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ROLES
// =============================================================================

/// A role tag carried by a session.
///
/// A user may hold several roles; exactly one of them is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Supplier,
    Admin,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 3] = [Role::Buyer, Role::Supplier, Role::Admin];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Supplier => "supplier",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "supplier" => Ok(Role::Supplier),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(" Supplier ".parse::<Role>(), Ok(Role::Supplier));
        assert!("vendor".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap_or_default();
        assert_eq!(json, "\"admin\"");
    }
}
