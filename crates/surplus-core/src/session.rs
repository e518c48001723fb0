//! # Session
//!
//! The authenticated identity and its lifecycle.
//!
//! A [`Session`] is created on login, refreshed on token renewal and destroyed
//! on logout or expiry. [`SessionContext`] owns the current session together
//! with the store it is persisted in; there is no ambient session state.

use crate::storage::{KeyValueStore, StoreError};
use crate::{Role, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Store key under which the session is persisted.
pub const SESSION_KEY: &str = "session";

/// Errors raised by session construction and lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session must hold at least one role")]
    NoRoles,

    #[error("active role {0} is not held by the session")]
    RoleNotHeld(Role),

    #[error("auth token is empty")]
    EmptyToken,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An authenticated session.
///
/// Invariant: `active_role` is always one of `roles`, and `roles` is never
/// empty. Fields are private so the invariant survives deserialization
/// through [`Session::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    user_id: UserId,
    roles: BTreeSet<Role>,
    active_role: Role,
    auth_token: String,
    expires_at: Timestamp,
}

impl Session {
    /// Create a session, checking its invariants.
    pub fn new(
        user_id: UserId,
        roles: impl IntoIterator<Item = Role>,
        active_role: Role,
        auth_token: impl Into<String>,
        expires_at: Timestamp,
    ) -> Result<Self, SessionError> {
        let session = Self {
            user_id,
            roles: roles.into_iter().collect(),
            active_role,
            auth_token: auth_token.into(),
            expires_at,
        };
        session.validate()?;
        Ok(session)
    }

    /// Check the invariants of a session obtained from outside.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.roles.is_empty() {
            return Err(SessionError::NoRoles);
        }
        if !self.roles.contains(&self.active_role) {
            return Err(SessionError::RoleNotHeld(self.active_role));
        }
        if self.auth_token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        Ok(())
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    #[must_use]
    pub fn active_role(&self) -> Role {
        self.active_role
    }

    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    #[must_use]
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// A session is expired from its expiry second onward.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Select another held role as the active one.
    pub fn switch_role(&mut self, role: Role) -> Result<(), SessionError> {
        if !self.has_role(role) {
            return Err(SessionError::RoleNotHeld(role));
        }
        self.active_role = role;
        Ok(())
    }

    /// Replace the credential after a token renewal.
    pub fn refresh(
        &mut self,
        auth_token: impl Into<String>,
        expires_at: Timestamp,
    ) -> Result<(), SessionError> {
        let token = auth_token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        self.auth_token = token;
        self.expires_at = expires_at;
        Ok(())
    }
}

// =============================================================================
// SESSION CONTEXT
// =============================================================================

/// Owner of the current session and its persistence.
///
/// Passed explicitly to whatever needs the session (gate, controllers).
#[derive(Debug)]
pub struct SessionContext<S: KeyValueStore> {
    store: S,
    current: Option<Session>,
}

impl<S: KeyValueStore> SessionContext<S> {
    /// Restore the context from the store.
    ///
    /// A persisted session that is expired at `now` or fails validation is
    /// removed instead of restored.
    pub fn open(store: S, now: Timestamp) -> Result<Self, SessionError> {
        let mut context = Self {
            store,
            current: None,
        };
        let restored: Option<Session> = context.store.get_value(SESSION_KEY)?;
        match restored {
            Some(session) if session.validate().is_ok() && !session.is_expired(now) => {
                context.current = Some(session);
            }
            Some(_) => context.store.remove(SESSION_KEY)?,
            None => {}
        }
        Ok(context)
    }

    /// Install a freshly acquired session (login).
    pub fn establish(&mut self, session: Session) -> Result<(), SessionError> {
        session.validate()?;
        self.store.set_value(SESSION_KEY, &session)?;
        self.current = Some(session);
        Ok(())
    }

    /// The live session, tearing it down first if it expired.
    pub fn current(&mut self, now: Timestamp) -> Result<Option<&Session>, SessionError> {
        if self.current.as_ref().is_some_and(|s| s.is_expired(now)) {
            self.teardown()?;
        }
        Ok(self.current.as_ref())
    }

    /// The held session without an expiry check.
    #[must_use]
    pub fn peek(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Renew the credential of the live session.
    pub fn refresh(
        &mut self,
        auth_token: impl Into<String>,
        expires_at: Timestamp,
    ) -> Result<(), SessionError> {
        let session = self.current.as_mut().ok_or(SessionError::NotAuthenticated)?;
        session.refresh(auth_token, expires_at)?;
        self.store.set_value(SESSION_KEY, &*session)?;
        Ok(())
    }

    /// Change the active role of the live session.
    pub fn switch_role(&mut self, role: Role) -> Result<(), SessionError> {
        let session = self.current.as_mut().ok_or(SessionError::NotAuthenticated)?;
        session.switch_role(role)?;
        self.store.set_value(SESSION_KEY, &*session)?;
        Ok(())
    }

    /// Destroy the session (logout or expiry).
    pub fn teardown(&mut self) -> Result<(), SessionError> {
        self.current = None;
        self.store.remove(SESSION_KEY)?;
        Ok(())
    }

    /// Give the store back.
    pub fn into_store(self) -> S {
        self.store
    }
}

// =============================================================================
// TESTS
// =============================================================================
