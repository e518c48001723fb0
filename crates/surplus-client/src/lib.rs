//! # Surplus Client - The Wire
//!
//! Typed access to the Surplus backend API, plus the controller that drives
//! the supplier verification form against it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use surplus_client::{ApiClient, VerificationController};
//! use surplus_core::UserId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), surplus_client::ControllerError> {
//!     let api = ApiClient::new("http://localhost:5000/api").with_token("jwt");
//!     let controller = VerificationController::new(Arc::new(api), UserId::new("sup-1"));
//!
//!     // Pick up where the supplier left off
//!     controller.resume().await?;
//!     println!("Resumed at step {}", controller.step());
//!     Ok(())
//! }
//! ```
//!
//! ## Endpoints
//!
//! ```text
//! ┌─────────────────────┐          HTTP           ┌─────────────────────┐
//! │  surplus front end  │ ◄───────────────────►   │   Backend API       │
//! │                     │  GET    /auth/me        │   (remote)          │
//! │  ┌───────────────┐  │  POST   /supplier/verification/draft          │
//! │  │ surplus-client│  │  GET    /supplier/verification/draft          │
//! │  └───────────────┘  │  DELETE /supplier/verification/draft          │
//! │                     │  POST   /supplier/verification/documents      │
//! │                     │  POST   /supplier/verification/submit         │
//! └─────────────────────┘  GET    /supplier/verification/status         │
//! ```

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use surplus_core::{
    Role, SaveDraftRequest, Session, SessionError, StepData, Timestamp, UserId, VerificationDraft,
};
use thiserror::Error;

mod backend;
mod controller;

pub use backend::VerificationBackend;
pub use controller::{ControllerError, ResumeOutcome, VerificationController};

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Errors from the backend API.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Server answered `success: false`.
    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(err) => err.is_timeout() || err.is_connect(),
            Error::Status { status, .. } => *status >= 500 || *status == 429,
            Error::Json(_) | Error::Server(_) => false,
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Response envelope used by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// Identity behind a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: UserId,
    /// Roles this front end knows; other tags are dropped.
    #[serde(deserialize_with = "known_roles")]
    pub roles: Vec<Role>,
    /// An unknown tag reads as absent.
    #[serde(default, deserialize_with = "known_role")]
    pub active_role: Option<Role>,
    pub expires_at: Timestamp,
}

fn known_roles<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Role>, D::Error> {
    let tags = Vec::<String>::deserialize(deserializer)?;
    Ok(tags
        .iter()
        .filter_map(|tag| match tag.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                tracing::debug!(role = %tag, "ignoring unknown role");
                None
            }
        })
        .collect())
}

fn known_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Role>, D::Error> {
    let tag = Option::<String>::deserialize(deserializer)?;
    Ok(tag.and_then(|tag| tag.parse::<Role>().ok()))
}

impl SessionInfo {
    /// Build a [`Session`] for `token`.
    ///
    /// Without an explicit active role the first held role (in role order)
    /// becomes active.
    pub fn into_session(self, token: impl Into<String>) -> Result<Session, SessionError> {
        let active = self
            .active_role
            .or_else(|| self.roles.iter().min().copied())
            .ok_or(SessionError::NoRoles)?;
        Session::new(self.user_id, self.roles, active, token, self.expires_at)
    }
}

/// Classification tag of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BusinessLicense,
    TaxCertificate,
    BankStatement,
}

impl DocumentType {
    /// Wire tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BusinessLicense => "business_license",
            DocumentType::TaxCertificate => "tax_certificate",
            DocumentType::BankStatement => "bank_statement",
        }
    }

    /// Field in the `documents` group that holds the reference.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            DocumentType::BusinessLicense => "businessLicense",
            DocumentType::TaxCertificate => "taxCertificate",
            DocumentType::BankStatement => "bankStatement",
        }
    }
}

/// A binary attachment to upload.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(document_type: DocumentType, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            document_type,
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Remote reference to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub url: String,
}

/// Review state of a supplier verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    NotStarted,
    Draft,
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ReviewState {
    /// A submission is on file and the form must not be edited.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            ReviewState::Pending | ReviewState::UnderReview | ReviewState::Approved
        )
    }
}

/// Current verification review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    pub status: ReviewState,
    #[serde(default)]
    pub submitted_at: Option<Timestamp>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

/// Acceptance of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub status: ReviewState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    step_data: &'a StepData,
}

// =============================================================================
// CLIENT
// =============================================================================

/// HTTP client for the Surplus backend API.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client for `base_url` with a 30-second timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token: None,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Same client, sending `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: Some(token.into()),
            client: self.client.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Resolve the bearer credential into session info.
    pub async fn current_session(&self) -> Result<SessionInfo, Error> {
        let resp = self.request(Method::GET, "/auth/me").send().await?;
        required(read_envelope(resp).await?)
    }

    /// Save the draft; returns the stored record.
    pub async fn save_draft(&self, request: &SaveDraftRequest) -> Result<VerificationDraft, Error> {
        let resp = self
            .request(Method::POST, "/supplier/verification/draft")
            .json(request)
            .send()
            .await?;
        required(read_envelope(resp).await?)
    }

    /// Latest draft of the current user, if any.
    pub async fn load_draft(&self) -> Result<Option<VerificationDraft>, Error> {
        let resp = self
            .request(Method::GET, "/supplier/verification/draft")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_envelope(resp).await
    }

    /// Delete the stored draft.
    pub async fn discard_draft(&self) -> Result<(), Error> {
        let resp = self
            .request(Method::DELETE, "/supplier/verification/draft")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    /// Upload a document as multipart form data (`file`, `documentType`).
    pub async fn upload_document(&self, upload: DocumentUpload) -> Result<DocumentRef, Error> {
        let mut part =
            reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name.clone());
        if let Some(content_type) = &upload.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = reqwest::multipart::Form::new()
            .text("documentType", upload.document_type.as_str())
            .part("file", part);

        let resp = self
            .request(Method::POST, "/supplier/verification/documents")
            .multipart(form)
            .send()
            .await?;
        required(read_envelope(resp).await?)
    }

    /// Submit the complete verification.
    pub async fn submit_verification(&self, step_data: &StepData) -> Result<SubmissionReceipt, Error> {
        let resp = self
            .request(Method::POST, "/supplier/verification/submit")
            .json(&SubmitRequest { step_data })
            .send()
            .await?;
        required(read_envelope(resp).await?)
    }

    /// Current review state.
    pub async fn verification_status(&self) -> Result<VerificationStatus, Error> {
        let resp = self
            .request(Method::GET, "/supplier/verification/status")
            .send()
            .await?;
        required(read_envelope(resp).await?)
    }
}

/// Unwrap the envelope of a response.
///
/// Non-2xx statuses become [`Error::Status`] (using the envelope message when
/// the body has one); `success: false` becomes [`Error::Server`]. An empty
/// body or `data: null` yields `None`.
async fn read_envelope<T: DeserializeOwned>(resp: Response) -> Result<Option<T>, Error> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|env| env.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(Error::Status {
            status: status.as_u16(),
            message,
        });
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let envelope: ApiEnvelope<T> = serde_json::from_slice(&body)?;
    if !envelope.success {
        return Err(Error::Server(
            envelope.message.unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    Ok(envelope.data)
}

fn required<T>(data: Option<T>) -> Result<T, Error> {
    data.ok_or_else(|| Error::Server("response carried no data".to_string()))
}
