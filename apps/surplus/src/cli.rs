//! # CLI Commands
//!
//! Local operations over the redb store (session, cart) plus a few backend
//! lookups. Each command prints its result and returns it for callers and
//! tests.

use std::path::Path;
use surplus_client::{ApiClient, VerificationStatus};
use surplus_core::{
    AccessGate, Cart, CartError, Decision, RedbStore, Role, RouteClass, RouteTable, Session,
    SessionContext, SessionError, StoreError, Timestamp, UnknownRole,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    #[error("backend error: {0}")]
    Api(#[from] surplus_client::Error),

    #[error(transparent)]
    Role(#[from] UnknownRole),

    #[error("not logged in")]
    NotLoggedIn,
}

fn open_session(store_path: &Path, now: Timestamp) -> Result<SessionContext<RedbStore>, CliError> {
    Ok(SessionContext::open(RedbStore::open(store_path)?, now)?)
}

fn print_session(session: &Session) {
    let roles: Vec<&str> = session.roles().iter().map(Role::as_str).collect();
    println!("User:        {}", session.user_id());
    println!("Roles:       {}", roles.join(", "));
    println!("Active role: {}", session.active_role());
    println!("Expires at:  {}", session.expires_at());
}

fn print_cart(cart: &Cart) -> Result<(), CliError> {
    if cart.is_empty() {
        println!("Cart is empty");
        return Ok(());
    }
    for line in cart.lines() {
        println!(
            "{:<24} x{:<5} @ {}",
            line.product_id,
            line.quantity,
            format_cents(line.unit_price_cents)
        );
    }
    println!("Items: {}", cart.item_count());
    println!("Total: {}", format_cents(cart.total_cents()?));
    Ok(())
}

/// `12345` -> `"123.45"`.
pub fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

// =============================================================================
// ROUTES
// =============================================================================

/// Print the classification of `path`.
pub fn cmd_classify(routes: &RouteTable, path: &str) -> RouteClass {
    let class = routes.classify(path);
    match class {
        RouteClass::Public => println!("{path}: public"),
        RouteClass::Protected => println!("{path}: protected"),
        RouteClass::RoleScoped(role) => println!("{path}: requires role {role}"),
    }
    class
}

/// Run the gate for `path` against the stored session.
pub fn cmd_check(
    store_path: &Path,
    gate: &AccessGate,
    path: &str,
    now: Timestamp,
) -> Result<Decision, CliError> {
    let mut context = open_session(store_path, now)?;
    let decision = gate.decide(path, context.current(now)?, now);
    match &decision {
        Decision::Allow => println!("allow"),
        Decision::AllowInactiveRole { required, active } => {
            println!("allow (requires {required}, active role is {active})");
        }
        Decision::RedirectToLogin { location } | Decision::RedirectUnauthorized { location } => {
            println!("redirect -> {location}");
        }
    }
    Ok(decision)
}

// =============================================================================
// SESSION
// =============================================================================

/// Resolve `token` with the backend and store the resulting session.
pub async fn cmd_session_login(
    store_path: &Path,
    api: &ApiClient,
    token: &str,
    now: Timestamp,
) -> Result<Session, CliError> {
    let info = api.with_token(token).current_session().await?;
    let session = info.into_session(token)?;
    if session.is_expired(now) {
        return Err(CliError::NotLoggedIn);
    }

    let mut context = open_session(store_path, now)?;
    context.establish(session.clone())?;
    println!("Logged in");
    print_session(&session);
    Ok(session)
}

/// Remove the stored session. Returns whether one existed.
pub fn cmd_session_logout(store_path: &Path, now: Timestamp) -> Result<bool, CliError> {
    let mut context = open_session(store_path, now)?;
    let existed = context.current(now)?.is_some();
    context.teardown()?;
    println!("{}", if existed { "Logged out" } else { "No session" });
    Ok(existed)
}

pub fn cmd_session_show(store_path: &Path, now: Timestamp) -> Result<Option<Session>, CliError> {
    let mut context = open_session(store_path, now)?;
    let session = context.current(now)?.cloned();
    match &session {
        Some(session) => print_session(session),
        None => println!("No session"),
    }
    Ok(session)
}

/// Switch the active role of the stored session.
pub fn cmd_session_role(store_path: &Path, role: &str, now: Timestamp) -> Result<Session, CliError> {
    let role: Role = role.parse()?;
    let mut context = open_session(store_path, now)?;
    if context.current(now)?.is_none() {
        return Err(CliError::NotLoggedIn);
    }
    context.switch_role(role)?;
    let session = context.peek().cloned().ok_or(CliError::NotLoggedIn)?;
    println!("Active role: {}", session.active_role());
    Ok(session)
}

// =============================================================================
// CART
// =============================================================================

pub fn cmd_cart_add(
    store_path: &Path,
    product_id: &str,
    quantity: u32,
    unit_price_cents: u64,
) -> Result<Cart, CliError> {
    let mut store = RedbStore::open(store_path)?;
    let mut cart = Cart::load(&store)?;
    cart.add(product_id, quantity, unit_price_cents)?;
    cart.save(&mut store)?;
    print_cart(&cart)?;
    Ok(cart)
}

pub fn cmd_cart_remove(store_path: &Path, product_id: &str) -> Result<Cart, CliError> {
    let mut store = RedbStore::open(store_path)?;
    let mut cart = Cart::load(&store)?;
    cart.remove(product_id)?;
    cart.save(&mut store)?;
    print_cart(&cart)?;
    Ok(cart)
}

pub fn cmd_cart_show(store_path: &Path) -> Result<Cart, CliError> {
    let store = RedbStore::open(store_path)?;
    let cart = Cart::load(&store)?;
    print_cart(&cart)?;
    Ok(cart)
}

pub fn cmd_cart_clear(store_path: &Path) -> Result<(), CliError> {
    let mut store = RedbStore::open(store_path)?;
    Cart::new().save(&mut store)?;
    println!("Cart cleared");
    Ok(())
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Fetch the verification review state with the stored credential.
pub async fn cmd_verification_status(
    store_path: &Path,
    api: &ApiClient,
    now: Timestamp,
) -> Result<VerificationStatus, CliError> {
    let token = {
        let mut context = open_session(store_path, now)?;
        let session = context.current(now)?.ok_or(CliError::NotLoggedIn)?;
        session.auth_token().to_string()
    };

    let status = api.with_token(token).verification_status().await?;
    println!("Status: {:?}", status.status);
    if let Some(at) = status.submitted_at {
        println!("Submitted at: {at}");
    }
    if let Some(notes) = &status.reviewer_notes {
        println!("Reviewer notes: {notes}");
    }
    Ok(status)
}
