//! The seam between the verification controller and the network.

use crate::{
    ApiClient, DocumentRef, DocumentUpload, Error, SubmissionReceipt, VerificationStatus,
};
use async_trait::async_trait;
use surplus_core::{SaveDraftRequest, StepData, VerificationDraft};

/// Remote operations the verification form depends on.
///
/// [`ApiClient`] is the production implementation; tests substitute fakes.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    async fn save_draft(&self, request: &SaveDraftRequest) -> Result<VerificationDraft, Error>;

    async fn load_draft(&self) -> Result<Option<VerificationDraft>, Error>;

    async fn discard_draft(&self) -> Result<(), Error>;

    async fn upload_document(&self, upload: DocumentUpload) -> Result<DocumentRef, Error>;

    async fn submit_verification(&self, step_data: &StepData) -> Result<SubmissionReceipt, Error>;

    async fn verification_status(&self) -> Result<VerificationStatus, Error>;
}

#[async_trait]
impl VerificationBackend for ApiClient {
    async fn save_draft(&self, request: &SaveDraftRequest) -> Result<VerificationDraft, Error> {
        ApiClient::save_draft(self, request).await
    }

    async fn load_draft(&self) -> Result<Option<VerificationDraft>, Error> {
        ApiClient::load_draft(self).await
    }

    async fn discard_draft(&self) -> Result<(), Error> {
        ApiClient::discard_draft(self).await
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<DocumentRef, Error> {
        ApiClient::upload_document(self, upload).await
    }

    async fn submit_verification(&self, step_data: &StepData) -> Result<SubmissionReceipt, Error> {
        ApiClient::submit_verification(self, step_data).await
    }

    async fn verification_status(&self) -> Result<VerificationStatus, Error> {
        ApiClient::verification_status(self).await
    }
}
