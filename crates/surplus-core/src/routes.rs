//! # Route Classifier
//!
//! Static classification of request paths.
//!
//! Matching rules:
//! - The root pattern `/` matches only the exact path `/`
//! - Any other pattern `p` matches `p` itself or anything under `p/`
//! - Public patterns win over role-scoped prefixes
//! - Everything unmatched is `Protected`
//!
//! Paths are matched in [`canonical_path`] form, so `//supplier`,
//! `/%73upplier` and `/buyer/../supplier` all land on `/supplier`.

use crate::Role;
use serde::{Deserialize, Serialize};

/// Public pages of the marketplace front end.
pub const MARKETPLACE_PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/marketplace",
    "/products",
    "/categories",
    "/about",
    "/contact",
    "/faq",
    "/terms",
    "/privacy",
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
    "/unauthorized",
];

/// Role-scoped dashboards of the marketplace front end.
pub const MARKETPLACE_ROLE_ROUTES: &[(&str, Role)] = &[
    ("/buyer", Role::Buyer),
    ("/supplier", Role::Supplier),
    ("/admin", Role::Admin),
];

/// Classification of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "visibility", content = "role", rename_all = "snake_case")]
pub enum RouteClass {
    /// Renders for anyone.
    Public,
    /// Requires any authenticated session.
    Protected,
    /// Requires a session holding the given role.
    RoleScoped(Role),
}

impl RouteClass {
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, RouteClass::Public)
    }

    /// The role required by this route, if any.
    #[must_use]
    pub fn required_role(&self) -> Option<Role> {
        match self {
            RouteClass::RoleScoped(role) => Some(*role),
            _ => None,
        }
    }
}

/// Immutable table of route patterns.
///
/// Built once at startup; `classify` never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    public: Vec<String>,
    role_scoped: Vec<(String, Role)>,
}

impl RouteTable {
    /// Empty table: every path is `Protected`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The default marketplace table.
    #[must_use]
    pub fn marketplace() -> Self {
        let mut table = Self::new();
        for pattern in MARKETPLACE_PUBLIC_ROUTES {
            table = table.with_public(*pattern);
        }
        for (prefix, role) in MARKETPLACE_ROLE_ROUTES {
            table = table.with_role_prefix(*prefix, *role);
        }
        table
    }

    /// Add a public pattern.
    #[must_use]
    pub fn with_public(mut self, pattern: impl Into<String>) -> Self {
        self.public.push(normalize_pattern(pattern.into()));
        self
    }

    /// Add a role-scoped prefix.
    #[must_use]
    pub fn with_role_prefix(mut self, prefix: impl Into<String>, role: Role) -> Self {
        self.role_scoped.push((normalize_pattern(prefix.into()), role));
        self
    }

    /// Public patterns in insertion order.
    pub fn public_patterns(&self) -> impl Iterator<Item = &str> {
        self.public.iter().map(String::as_str)
    }

    /// Classify a request path.
    ///
    /// Query strings and fragments are ignored.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = canonical_path(path);

        if self.public.iter().any(|p| matches_pattern(p, &path)) {
            return RouteClass::Public;
        }

        // Longest prefix wins so nested role areas can be declared.
        self.role_scoped
            .iter()
            .filter(|(prefix, _)| matches_pattern(prefix, &path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, role)| RouteClass::RoleScoped(*role))
            .unwrap_or(RouteClass::Protected)
    }
}

/// Prefix match with the root special case.
#[must_use]
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "/" {
        return path == "/";
    }
    match path.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Canonical form of a request path.
///
/// Drops the query and fragment, percent-decodes once, treats `\` as a
/// separator, collapses empty segments and resolves `.` and `..`. The
/// result always starts with `/` and never ends with one unless it is `/`.
#[must_use]
pub fn canonical_path(path: &str) -> String {
    let raw = strip_query(path);
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(decoded.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn normalize_pattern(mut pattern: String) -> String {
    if !pattern.starts_with('/') {
        pattern.insert(0, '/');
    }
    while pattern.len() > 1 && pattern.ends_with('/') {
        pattern.pop();
    }
    pattern
}

// =============================================================================
// TESTS
// =============================================================================
