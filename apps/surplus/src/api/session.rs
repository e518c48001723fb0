//! Per-request session resolution.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use surplus_client::ApiClient;
use surplus_core::{Session, SessionError};
use thiserror::Error;

/// Cookie carrying the credential when no `Authorization` header is sent.
pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Api(#[from] surplus_client::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Turns a bearer credential into a [`Session`].
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Session, ResolveError>;
}

/// Resolves credentials through the backend's `GET /auth/me`.
#[derive(Debug, Clone)]
pub struct RemoteSessionResolver {
    client: ApiClient,
}

impl RemoteSessionResolver {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionResolver for RemoteSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Session, ResolveError> {
        let info = self.client.with_token(token).current_session().await?;
        Ok(info.into_session(token)?)
    }
}

/// Credential of a request: `Authorization: Bearer` first, then the
/// `token` cookie.
pub fn credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
