//! # HTTP Server
//!
//! Every request passes the access gate before reaching a view:
//!
//! ```text
//! request ─► TraceLayer ─► gate ──redirect (307)──► login / unauthorized
//!                           │
//!                           └─allow─► /health | view descriptor
//! ```
//!
//! Views are rendered as JSON descriptors `{ view, user_id, active_role }`.

pub mod session;

use crate::config::ServeArgs;
use crate::unix_now;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use surplus_client::ApiClient;
use surplus_core::{AccessGate, Decision, Role, Session, UserId, canonical_path};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub use session::{RemoteSessionResolver, ResolveError, SessionResolver, credential};

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub resolver: Arc<dyn SessionResolver>,
}

impl AppState {
    pub fn new(gate: AccessGate, resolver: Arc<dyn SessionResolver>) -> Self {
        Self {
            gate: Arc::new(gate),
            resolver,
        }
    }
}

/// JSON rendering of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewDescriptor {
    pub view: String,
    pub user_id: Option<UserId>,
    pub active_role: Option<Role>,
}

/// Create the router: `/health`, gated views, tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(view)
        .layer(middleware::from_fn_with_state(state.clone(), gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(args: ServeArgs) -> std::io::Result<()> {
    let resolver = RemoteSessionResolver::new(ApiClient::new(args.api.api_url.as_str()));
    let state = AppState::new(args.gate.access_gate(), Arc::new(resolver));
    let app = create_router(state);

    let listener = TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, api = %args.api.api_url, "surplus listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("surplus shutting down");
    Ok(())
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Resolve the session, ask the gate, then redirect or continue.
///
/// The resolved session travels to the view as a request extension.
async fn gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    // The login return target is rebuilt from the canonical path so a
    // `//host` style path never becomes an off-site redirect.
    let target = match request.uri().query() {
        Some(query) => format!("{}?{query}", canonical_path(&path)),
        None => canonical_path(&path),
    };

    let session = match credential(request.headers()) {
        Some(token) => match state.resolver.resolve(&token).await {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %path, error = %err, "session resolution failed");
                None
            }
        },
        None => None,
    };

    let class = state.gate.routes().classify(&path);
    let decision = state
        .gate
        .decide_classified(&target, class, session.as_ref(), unix_now());

    match decision {
        Decision::Allow => {}
        Decision::AllowInactiveRole { required, active } => {
            info!(
                path = %path,
                required = %required,
                active = %active,
                "rendering view outside the active role"
            );
        }
        Decision::RedirectToLogin { location } | Decision::RedirectUnauthorized { location } => {
            debug!(path = %path, location = %location, "gate redirect");
            return Redirect::temporary(&location).into_response();
        }
    }

    if let Some(session) = session {
        request.extensions_mut().insert(session);
    }
    next.run(request).await
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn view(request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let session = request.extensions().get::<Session>();
    Json(ViewDescriptor {
        view: request.uri().path().to_string(),
        user_id: session.map(|s| s.user_id().clone()),
        active_role: session.map(Session::active_role),
    })
    .into_response()
}

// =============================================================================
// SHUTDOWN
// =============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received terminate signal"),
    }
}
