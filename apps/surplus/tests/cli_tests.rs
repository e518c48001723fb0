//! Integration tests for Surplus CLI commands.
//!
//! Uses tempfile for the redb store and wiremock for the backend.

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;
use std::path::PathBuf;
use surplus::cli::{
    CliError, cmd_cart_add, cmd_cart_clear, cmd_cart_remove, cmd_cart_show, cmd_check,
    cmd_classify, cmd_session_login, cmd_session_logout, cmd_session_role, cmd_session_show,
    cmd_verification_status,
};
use surplus::config::GateArgs;
use surplus_client::{ApiClient, ReviewState};
use surplus_core::{CartError, Decision, Role, RouteClass, RouteTable, SessionError};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: u64 = 1_700_000_000;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("surplus.redb")
}

async fn backend_with_session(roles: serde_json::Value, active: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer jwt-ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "userId": "u-42",
                "roles": roles,
                "activeRole": active,
                "expiresAt": NOW + 3_600
            }
        })))
        .mount(&server)
        .await;
    server
}

// =============================================================================
// ROUTE COMMANDS
// =============================================================================

#[test]
fn test_classify_marketplace_paths() {
    let routes = RouteTable::marketplace();
    assert_eq!(cmd_classify(&routes, "/faq"), RouteClass::Public);
    assert_eq!(cmd_classify(&routes, "/orders"), RouteClass::Protected);
    assert_eq!(
        cmd_classify(&routes, "/supplier/listings/new"),
        RouteClass::RoleScoped(Role::Supplier)
    );
}

#[test]
fn test_check_without_session_redirects() {
    let temp = create_temp_dir();
    let gate = GateArgs::default().access_gate();

    let decision = cmd_check(&store_path(&temp), &gate, "/buyer/cart", NOW).unwrap();
    assert_eq!(
        decision,
        Decision::RedirectToLogin {
            location: "/login?redirect=/buyer/cart".into()
        }
    );
}

// =============================================================================
// SESSION COMMANDS
// =============================================================================

#[tokio::test]
async fn test_login_stores_session_for_later_commands() {
    let temp = create_temp_dir();
    let store = store_path(&temp);
    let backend = backend_with_session(json!(["buyer", "supplier"]), "buyer").await;
    let api = ApiClient::new(backend.uri());

    let session = cmd_session_login(&store, &api, "jwt-ok", NOW).await.unwrap();
    assert_eq!(session.active_role(), Role::Buyer);

    let shown = cmd_session_show(&store, NOW).unwrap().unwrap();
    assert_eq!(shown, session);

    let gate = GateArgs::default().access_gate();
    assert_eq!(
        cmd_check(&store, &gate, "/buyer/orders", NOW).unwrap(),
        Decision::Allow
    );
    assert_eq!(
        cmd_check(&store, &gate, "/supplier/dashboard", NOW).unwrap(),
        Decision::AllowInactiveRole {
            required: Role::Supplier,
            active: Role::Buyer
        }
    );
}

#[tokio::test]
async fn test_login_with_rejected_token_fails() {
    let temp = create_temp_dir();
    let backend = backend_with_session(json!(["buyer"]), "buyer").await;
    let api = ApiClient::new(backend.uri());

    let result = cmd_session_login(&store_path(&temp), &api, "jwt-bad", NOW).await;
    assert!(matches!(result, Err(CliError::Api(_))));
    assert!(cmd_session_show(&store_path(&temp), NOW).unwrap().is_none());
}

#[tokio::test]
async fn test_role_switch_requires_held_role() {
    let temp = create_temp_dir();
    let store = store_path(&temp);
    let backend = backend_with_session(json!(["buyer", "supplier"]), "buyer").await;
    cmd_session_login(&store, &ApiClient::new(backend.uri()), "jwt-ok", NOW)
        .await
        .unwrap();

    let session = cmd_session_role(&store, "supplier", NOW).unwrap();
    assert_eq!(session.active_role(), Role::Supplier);
    assert_eq!(
        cmd_session_show(&store, NOW).unwrap().unwrap().active_role(),
        Role::Supplier
    );

    assert!(matches!(
        cmd_session_role(&store, "admin", NOW),
        Err(CliError::Session(SessionError::RoleNotHeld(Role::Admin)))
    ));
    assert!(matches!(
        cmd_session_role(&store, "janitor", NOW),
        Err(CliError::Role(_))
    ));
}

#[tokio::test]
async fn test_session_expires_and_logout() {
    let temp = create_temp_dir();
    let store = store_path(&temp);
    let backend = backend_with_session(json!(["buyer"]), "buyer").await;
    cmd_session_login(&store, &ApiClient::new(backend.uri()), "jwt-ok", NOW)
        .await
        .unwrap();

    // Past the expiry the stored session is gone
    assert!(cmd_session_show(&store, NOW + 7_200).unwrap().is_none());
    assert!(!cmd_session_logout(&store, NOW).unwrap());
}

#[test]
fn test_role_switch_without_session() {
    let temp = create_temp_dir();
    assert!(matches!(
        cmd_session_role(&store_path(&temp), "buyer", NOW),
        Err(CliError::NotLoggedIn)
    ));
}

// =============================================================================
// CART COMMANDS
// =============================================================================

#[test]
fn test_cart_persists_between_commands() {
    let temp = create_temp_dir();
    let store = store_path(&temp);

    cmd_cart_add(&store, "pallet-a", 2, 1_500).unwrap();
    cmd_cart_add(&store, "pallet-b", 1, 9_900).unwrap();
    let cart = cmd_cart_add(&store, "pallet-a", 1, 1_500).unwrap();
    assert_eq!(cart.line("pallet-a").unwrap().quantity, 3);

    let shown = cmd_cart_show(&store).unwrap();
    assert_eq!(shown, cart);
    assert_eq!(shown.total_cents().unwrap(), 3 * 1_500 + 9_900);

    let after_remove = cmd_cart_remove(&store, "pallet-b").unwrap();
    assert_eq!(after_remove.lines().len(), 1);

    cmd_cart_clear(&store).unwrap();
    assert!(cmd_cart_show(&store).unwrap().is_empty());
}

#[test]
fn test_cart_rejects_bad_input() {
    let temp = create_temp_dir();
    let store = store_path(&temp);

    assert!(matches!(
        cmd_cart_add(&store, "x", 0, 100),
        Err(CliError::Cart(CartError::ZeroQuantity))
    ));
    assert!(matches!(
        cmd_cart_remove(&store, "missing"),
        Err(CliError::Cart(CartError::NotInCart(_)))
    ));
}

// =============================================================================
// VERIFICATION COMMANDS
// =============================================================================

#[tokio::test]
async fn test_verification_status_uses_stored_credential() {
    let temp = create_temp_dir();
    let store = store_path(&temp);
    let backend = backend_with_session(json!(["supplier"]), "supplier").await;
    Mock::given(method("GET"))
        .and(path("/supplier/verification/status"))
        .and(header("authorization", "Bearer jwt-ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "status": "pending", "submittedAt": NOW }
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let api = ApiClient::new(backend.uri());
    cmd_session_login(&store, &api, "jwt-ok", NOW).await.unwrap();

    let status = cmd_verification_status(&store, &api, NOW).await.unwrap();
    assert_eq!(status.status, ReviewState::Pending);
    assert!(status.status.is_locked());
}

#[tokio::test]
async fn test_verification_status_requires_login() {
    let temp = create_temp_dir();
    let api = ApiClient::new("http://127.0.0.1:1");
    assert!(matches!(
        cmd_verification_status(&store_path(&temp), &api, NOW).await,
        Err(CliError::NotLoggedIn)
    ));
}
