//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its `SURPLUS_*`
//! environment variable.

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use surplus_core::{AccessGate, GateConfig, InactiveRolePolicy, RouteTable};

/// Default backend API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "surplus=info,tower_http=info";

/// Gate redirect targets and policy.
#[derive(Debug, Clone, Args)]
pub struct GateArgs {
    /// Login view; unauthenticated visitors are sent here
    #[arg(long, env = "SURPLUS_LOGIN_PATH", default_value = "/login")]
    pub login_path: String,

    /// View for authenticated visitors lacking the required role
    #[arg(long, env = "SURPLUS_UNAUTHORIZED_PATH", default_value = "/unauthorized")]
    pub unauthorized_path: String,

    /// Deny role-scoped views whose role is held but not active
    #[arg(long, env = "SURPLUS_ENFORCE_ACTIVE_ROLE")]
    pub enforce_active_role: bool,
}

impl Default for GateArgs {
    fn default() -> Self {
        let config = GateConfig::default();
        Self {
            login_path: config.login_path,
            unauthorized_path: config.unauthorized_path,
            enforce_active_role: false,
        }
    }
}

impl GateArgs {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            login_path: self.login_path.clone(),
            unauthorized_path: self.unauthorized_path.clone(),
            inactive_role: if self.enforce_active_role {
                InactiveRolePolicy::Deny
            } else {
                InactiveRolePolicy::Allow
            },
            ..GateConfig::default()
        }
    }

    /// Marketplace routes plus the redirect targets and `/health`.
    pub fn access_gate(&self) -> AccessGate {
        let routes = RouteTable::marketplace()
            .with_public("/health")
            .with_public(self.login_path.as_str())
            .with_public(self.unauthorized_path.as_str());
        AccessGate::new(routes, self.gate_config())
    }
}

/// Backend API location.
#[derive(Debug, Clone, Args)]
pub struct ApiArgs {
    /// Backend API base URL
    #[arg(long, env = "SURPLUS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// Local store location.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// redb file holding the session and cart
    #[arg(long, env = "SURPLUS_STORE", default_value = "surplus.redb")]
    pub store: PathBuf,
}

/// Options of `surplus serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "SURPLUS_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub gate: GateArgs,
}
