//! # Access Gate
//!
//! Per-navigation decision: render the requested view or redirect.
//!
//! The gate is pure. It never fails; a missing or expired session is the
//! ordinary "not authenticated" outcome and yields a login redirect.

use crate::routes::{RouteClass, RouteTable};
use crate::session::Session;
use crate::{Role, Timestamp};
use serde::{Deserialize, Serialize};

/// How to treat a route whose role is held by the session but not active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveRolePolicy {
    /// Render anyway; the caller logs a notice.
    #[default]
    Allow,
    /// Treat as unauthorized.
    Deny,
}

/// Redirect targets and policies of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub login_path: String,
    pub unauthorized_path: String,
    /// Query parameter carrying the original path on login redirects.
    pub return_param: String,
    pub inactive_role: InactiveRolePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            return_param: "redirect".to_string(),
            inactive_role: InactiveRolePolicy::Allow,
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Render the view.
    Allow,
    /// Render the view, although the required role is not the active one.
    AllowInactiveRole { required: Role, active: Role },
    /// No valid session: go to the login view.
    RedirectToLogin { location: String },
    /// Session lacks the required role.
    RedirectUnauthorized { location: String },
}

impl Decision {
    /// Whether the view renders.
    #[must_use]
    pub fn allows(&self) -> bool {
        matches!(self, Decision::Allow | Decision::AllowInactiveRole { .. })
    }

    /// Redirect target, if this is a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Decision::RedirectToLogin { location } | Decision::RedirectUnauthorized { location } => {
                Some(location)
            }
            _ => None,
        }
    }
}

/// The access gate: a route table plus redirect configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    routes: RouteTable,
    config: GateConfig,
}

impl AccessGate {
    #[must_use]
    pub fn new(routes: RouteTable, config: GateConfig) -> Self {
        Self { routes, config }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Classify `path` and decide.
    #[must_use]
    pub fn decide(&self, path: &str, session: Option<&Session>, now: Timestamp) -> Decision {
        let class = self.routes.classify(path);
        self.decide_classified(path, class, session, now)
    }

    /// Decide for an already classified path.
    #[must_use]
    pub fn decide_classified(
        &self,
        path: &str,
        class: RouteClass,
        session: Option<&Session>,
        now: Timestamp,
    ) -> Decision {
        if class.is_public() {
            return Decision::Allow;
        }

        let Some(session) = session.filter(|s| !s.is_expired(now)) else {
            return Decision::RedirectToLogin {
                location: self.login_location(path),
            };
        };

        let Some(required) = class.required_role() else {
            return Decision::Allow;
        };

        if !session.has_role(required) {
            return self.unauthorized();
        }

        if session.active_role() != required {
            return match self.config.inactive_role {
                InactiveRolePolicy::Allow => Decision::AllowInactiveRole {
                    required,
                    active: session.active_role(),
                },
                InactiveRolePolicy::Deny => self.unauthorized(),
            };
        }

        Decision::Allow
    }

    /// Login view location carrying `path` as the return target.
    #[must_use]
    pub fn login_location(&self, path: &str) -> String {
        format!(
            "{}?{}={}",
            self.config.login_path,
            self.config.return_param,
            encode_return_path(path)
        )
    }

    fn unauthorized(&self) -> Decision {
        Decision::RedirectUnauthorized {
            location: self.config.unauthorized_path.clone(),
        }
    }
}

/// Percent-encode a path for use as a query value.
///
/// Unreserved characters and `/` are kept so the common case stays readable.
#[must_use]
pub fn encode_return_path(path: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push(HEX[(byte >> 4) as usize] as char);
                out.push(HEX[(byte & 0x0f) as usize] as char);
            }
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
