//! Verification controller tests against an in-memory backend.

#![allow(clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use surplus_client::{
    ControllerError, DocumentRef, DocumentType, DocumentUpload, Error, ResumeOutcome,
    ReviewState, SubmissionReceipt, VerificationBackend, VerificationController,
    VerificationStatus,
};
use surplus_core::{
    AutosaveStatus, Backoff, Phase, SaveDraftRequest, Step, StepData, UserId, VerificationDraft,
    WizardError,
};

const OWNER: &str = "sup-1";

// =============================================================================
// FAKE BACKEND
// =============================================================================

#[derive(Default)]
struct FakeBackend {
    saves: Mutex<Vec<SaveDraftRequest>>,
    save_failures: Mutex<VecDeque<u16>>,
    draft: Mutex<Option<VerificationDraft>>,
    status: Mutex<Option<ReviewState>>,
    submits: AtomicUsize,
    submit_error: Mutex<Option<String>>,
    discards: AtomicUsize,
    discard_error: Mutex<Option<String>>,
}

impl FakeBackend {
    fn saves(&self) -> Vec<SaveDraftRequest> {
        self.saves.lock().unwrap().clone()
    }

    fn fail_next_saves(&self, statuses: &[u16]) {
        self.save_failures.lock().unwrap().extend(statuses);
    }
}

#[async_trait]
impl VerificationBackend for FakeBackend {
    async fn save_draft(&self, request: &SaveDraftRequest) -> Result<VerificationDraft, Error> {
        if let Some(status) = self.save_failures.lock().unwrap().pop_front() {
            return Err(Error::Status {
                status,
                message: "save failed".into(),
            });
        }
        let mut saves = self.saves.lock().unwrap();
        saves.push(request.clone());
        let draft = VerificationDraft {
            owner_user_id: UserId::new(OWNER),
            step_index: request.step_index,
            step_data: request.step_data.clone(),
            last_saved_at: 1_700_000_000 + saves.len() as u64,
        };
        *self.draft.lock().unwrap() = Some(draft.clone());
        Ok(draft)
    }

    async fn load_draft(&self) -> Result<Option<VerificationDraft>, Error> {
        Ok(self.draft.lock().unwrap().clone())
    }

    async fn discard_draft(&self) -> Result<(), Error> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(message) = self.discard_error.lock().unwrap().clone() {
            return Err(Error::Server(message));
        }
        self.draft.lock().unwrap().take();
        Ok(())
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<DocumentRef, Error> {
        let id = format!("doc-{}", upload.document_type.as_str());
        Ok(DocumentRef {
            url: format!("https://files.example/{id}"),
            id,
        })
    }

    async fn submit_verification(&self, _step_data: &StepData) -> Result<SubmissionReceipt, Error> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let error = self.submit_error.lock().unwrap().clone();
        match error {
            Some(message) => Err(Error::Server(message)),
            None => {
                // Accepted submissions replace the draft
                self.draft.lock().unwrap().take();
                Ok(SubmissionReceipt {
                    submission_id: "sub-1".into(),
                    status: ReviewState::Pending,
                })
            }
        }
    }

    async fn verification_status(&self) -> Result<VerificationStatus, Error> {
        let status = self.status.lock().unwrap().unwrap_or(ReviewState::Draft);
        Ok(VerificationStatus {
            status,
            submitted_at: None,
            reviewer_notes: None,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn controller(backend: &Arc<FakeBackend>) -> VerificationController {
    VerificationController::new(backend.clone(), UserId::new(OWNER)).with_backoff(Backoff {
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        max_retries: 3,
    })
}

fn fields(value: Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Vec::new(),
    }
}

fn valid_group(step: Step) -> Value {
    match step {
        Step::Identity => json!({
            "fullName": "Ada Okafor",
            "email": "ada@steelworks.example",
            "phone": "+234 803 555 0101",
            "nationalIdNumber": "NIN-4431"
        }),
        Step::BankAccount => json!({
            "accountHolderName": "Steelworks Ltd",
            "accountNumber": "0123456789",
            "bankName": "First Bank",
            "routingCode": "011"
        }),
        Step::BusinessDetails => json!({
            "legalName": "Steelworks Ltd",
            "registrationNumber": "RC-99812",
            "taxId": "TIN-22",
            "businessAddress": "12 Wharf Rd, Apapa"
        }),
        Step::OperationalInfo => json!({
            "warehouseAddress": "Plot 4, Agbara",
            "productCategories": ["metals"],
            "monthlyVolume": 120
        }),
        Step::Documents => json!({
            "businessLicense": {"id": "d1", "url": "https://files.example/d1"},
            "taxCertificate": {"id": "d2", "url": "https://files.example/d2"},
            "bankStatement": {"id": "d3", "url": "https://files.example/d3"}
        }),
        Step::Review => json!({ "confirmAccuracy": true }),
    }
}

/// Fill every group and walk to the review step.
fn complete_to_review(controller: &VerificationController) {
    for step in Step::ALL {
        controller
            .merge_group(step.group(), fields(valid_group(step)))
            .unwrap();
    }
    while controller.step() != Step::Review {
        controller.advance().unwrap();
    }
}

// =============================================================================
// RESUME
// =============================================================================

#[tokio::test]
async fn test_resume_restores_step_and_data() {
    let backend = Arc::new(FakeBackend::default());
    let mut step_data = StepData::new();
    step_data.insert(
        "bankAccount".into(),
        fields(json!({"bankName": "First Bank"})).into_iter().collect(),
    );
    *backend.draft.lock().unwrap() = Some(VerificationDraft {
        owner_user_id: UserId::new(OWNER),
        step_index: 2,
        step_data,
        last_saved_at: 1_700_000_000,
    });

    let controller = controller(&backend);
    let outcome = controller.resume().await.unwrap();

    assert_eq!(
        outcome,
        ResumeOutcome::Resumed {
            step: Step::BusinessDetails
        }
    );
    assert_eq!(controller.step().index(), 2);
    assert_eq!(
        controller.field("bankAccount", "bankName"),
        Some(json!("First Bank"))
    );
    assert!(!controller.has_unsaved_changes());
}

#[tokio::test]
async fn test_resume_at_step_three_keeps_exact_data() {
    let backend = Arc::new(FakeBackend::default());
    let mut step_data = StepData::new();
    for step in [Step::Identity, Step::BankAccount] {
        step_data.insert(
            step.group().to_string(),
            fields(valid_group(step)).into_iter().collect(),
        );
    }
    step_data.insert(
        "businessDetails".into(),
        fields(json!({"legalName": "Steelworks Ltd"})).into_iter().collect(),
    );
    *backend.draft.lock().unwrap() = Some(VerificationDraft {
        owner_user_id: UserId::new(OWNER),
        step_index: 3,
        step_data: step_data.clone(),
        last_saved_at: 1_700_000_000,
    });

    let controller = controller(&backend);
    controller.resume().await.unwrap();

    assert_eq!(controller.step(), Step::OperationalInfo);
    assert_eq!(controller.data(), step_data);
}

#[tokio::test]
async fn test_resume_ignores_foreign_draft() {
    let backend = Arc::new(FakeBackend::default());
    *backend.draft.lock().unwrap() = Some(VerificationDraft {
        owner_user_id: UserId::new("someone-else"),
        step_index: 4,
        step_data: StepData::new(),
        last_saved_at: 0,
    });

    let controller = controller(&backend);
    assert_eq!(controller.resume().await.unwrap(), ResumeOutcome::Fresh);
    assert_eq!(controller.step(), Step::Identity);
}

#[tokio::test]
async fn test_resume_without_draft_starts_fresh() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);
    assert_eq!(controller.resume().await.unwrap(), ResumeOutcome::Fresh);
    assert_eq!(controller.phase(), Phase::Editing);
}

#[tokio::test]
async fn test_resume_locks_when_under_review() {
    let backend = Arc::new(FakeBackend::default());
    *backend.status.lock().unwrap() = Some(ReviewState::UnderReview);

    let controller = controller(&backend);
    assert_eq!(
        controller.resume().await.unwrap(),
        ResumeOutcome::Locked(ReviewState::UnderReview)
    );
    assert_eq!(controller.phase(), Phase::Submitted);
    assert_eq!(
        controller.set_field("identity", "fullName", json!("x")),
        Err(WizardError::Submitted)
    );
}

// =============================================================================
// NAVIGATION + AUTOSAVE
// =============================================================================

#[tokio::test]
async fn test_invalid_advance_makes_no_save() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    controller
        .set_field("identity", "fullName", json!("Ada"))
        .unwrap();
    let err = controller.advance().unwrap_err();
    let WizardError::Invalid(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert!(errors.for_field("identity", "email").is_some());

    controller.settle().await;
    assert_eq!(controller.step(), Step::Identity);
    assert!(backend.saves().is_empty());
}

#[tokio::test]
async fn test_advance_saves_in_background() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();
    let transition = controller.advance().unwrap();
    assert_eq!(transition.to, Step::BankAccount);
    assert_eq!(controller.step(), Step::BankAccount);

    controller.settle().await;
    let saves = backend.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].step_index, 1);
    assert_eq!(saves[0].step_data["identity"]["fullName"], json!("Ada Okafor"));
    assert!(matches!(
        controller.autosave_status(),
        AutosaveStatus::Saved { .. }
    ));
    assert!(!controller.has_unsaved_changes());
}

#[tokio::test]
async fn test_retreat_keeps_later_data() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();
    controller.advance().unwrap();
    controller
        .set_field("bankAccount", "bankName", json!("First Bank"))
        .unwrap();
    controller.retreat().unwrap();
    assert_eq!(controller.step(), Step::Identity);
    assert!(controller.retreat().unwrap().is_none());

    assert_eq!(
        controller.field("bankAccount", "bankName"),
        Some(json!("First Bank"))
    );
    controller.settle().await;
    assert_eq!(backend.saves().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_save_failures_retry() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_next_saves(&[503, 429]);
    let controller = controller(&backend);

    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();
    controller.advance().unwrap();
    controller.settle().await;

    assert_eq!(backend.saves().len(), 1);
    assert!(matches!(
        controller.autosave_status(),
        AutosaveStatus::Saved { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_save_failure_waits_for_next_tick() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_next_saves(&[400]);
    let controller = controller(&backend);

    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();
    controller.advance().unwrap();
    controller.settle().await;

    assert!(backend.saves().is_empty());
    assert!(matches!(
        controller.autosave_status(),
        AutosaveStatus::Failed { .. }
    ));
    assert!(controller.has_unsaved_changes());

    assert!(controller.autosave_tick());
    controller.settle().await;
    assert_eq!(backend.saves().len(), 1);
    assert!(!controller.autosave_tick());
}

#[tokio::test(start_paused = true)]
async fn test_autosave_timer_saves_edits() {
    let backend = Arc::new(FakeBackend::default());
    let controller = Arc::new(controller(&backend));

    controller
        .set_field("identity", "fullName", json!("Ada"))
        .unwrap();
    let timer = controller.spawn_autosave_timer(Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    controller.settle().await;
    timer.abort();

    let saves = backend.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].step_index, 0);
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[tokio::test]
async fn test_attach_document_records_reference() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    let reference = controller
        .attach_document(DocumentUpload::new(
            DocumentType::BankStatement,
            "statement.pdf",
            vec![1, 2, 3],
        ))
        .await
        .unwrap();

    assert_eq!(
        controller.field("documents", "bankStatement"),
        Some(json!({ "id": reference.id, "url": reference.url }))
    );
}

// =============================================================================
// SUBMISSION
// =============================================================================

#[tokio::test]
async fn test_submit_requires_final_step() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Wizard(WizardError::NotAtFinalStep)
    ));
    assert_eq!(backend.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_double_submit_sends_once() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);
    complete_to_review(&controller);

    let (first, second) = tokio::join!(controller.submit(), controller.submit());

    assert_eq!(first.unwrap().submission_id, "sub-1");
    assert!(matches!(
        second,
        Err(ControllerError::Wizard(WizardError::SubmissionInFlight))
    ));
    assert_eq!(backend.submits.load(Ordering::SeqCst), 1);
    assert_eq!(controller.phase(), Phase::Submitted);
    assert!(matches!(
        controller.advance(),
        Err(WizardError::Submitted)
    ));
    controller.settle().await;
}

#[tokio::test]
async fn test_failed_submit_shows_banner_and_keeps_data() {
    let backend = Arc::new(FakeBackend::default());
    *backend.submit_error.lock().unwrap() = Some("tax id already registered".into());
    let controller = controller(&backend);
    complete_to_review(&controller);

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, ControllerError::Backend(Error::Server(_))));

    assert_eq!(controller.phase(), Phase::Editing);
    assert_eq!(controller.step(), Step::Review);
    assert!(
        controller
            .banner()
            .is_some_and(|b| b.contains("tax id already registered"))
    );
    assert_eq!(
        controller.field("identity", "fullName"),
        Some(json!("Ada Okafor"))
    );

    controller.dismiss_banner();
    assert!(controller.banner().is_none());

    // Retry once the backend recovers
    backend.submit_error.lock().unwrap().take();
    controller.submit().await.unwrap();
    assert_eq!(controller.phase(), Phase::Submitted);
    controller.settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_stops_pending_autosave_retries() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);
    for step in Step::ALL {
        controller
            .merge_group(step.group(), fields(valid_group(step)))
            .unwrap();
    }
    while controller.step() != Step::Review {
        controller.advance().unwrap();
        controller.settle().await;
    }

    // Leave one save waiting out its backoff
    backend.fail_next_saves(&[503]);
    controller
        .set_field("review", "confirmAccuracy", json!(true))
        .unwrap();
    assert!(controller.autosave_tick());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(
        controller.autosave_status(),
        AutosaveStatus::RetryPending { .. }
    ));
    let saves_before = backend.saves().len();

    controller.submit().await.unwrap();
    assert_eq!(controller.phase(), Phase::Submitted);
    assert!(backend.draft.lock().unwrap().is_none());

    controller.settle().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    controller.settle().await;
    assert_eq!(backend.saves().len(), saves_before);
    assert!(backend.draft.lock().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_submit_lets_autosave_resume() {
    let backend = Arc::new(FakeBackend::default());
    *backend.submit_error.lock().unwrap() = Some("backend unavailable".into());
    let controller = controller(&backend);
    complete_to_review(&controller);

    controller.submit().await.unwrap_err();
    assert!(controller.has_unsaved_changes());
    assert!(controller.autosave_tick());
    controller.settle().await;
    assert!(!controller.has_unsaved_changes());
    assert_eq!(backend.saves().last().unwrap().step_index, Step::Review.index());
}

// =============================================================================
// DISCARD
// =============================================================================

#[tokio::test]
async fn test_discard_resets_to_first_step() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);

    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();
    controller.advance().unwrap();
    controller.discard().await.unwrap();

    assert_eq!(backend.discards.load(Ordering::SeqCst), 1);
    assert_eq!(controller.step(), Step::Identity);
    assert!(controller.data().is_empty());
    assert_eq!(controller.autosave_status(), AutosaveStatus::Idle);
}

#[tokio::test]
async fn test_edits_are_refused_while_discarding() {
    let backend = Arc::new(FakeBackend::default());
    let controller = controller(&backend);
    controller
        .merge_group("identity", fields(valid_group(Step::Identity)))
        .unwrap();

    let (discarded, (edit, advance)) = tokio::join!(controller.discard(), async {
        (
            controller.set_field("identity", "fullName", json!("Late Edit")),
            controller.advance(),
        )
    });

    discarded.unwrap();
    assert_eq!(edit, Err(WizardError::DiscardInFlight));
    assert_eq!(advance, Err(WizardError::DiscardInFlight));
    assert!(controller.data().is_empty());
    assert_eq!(controller.phase(), Phase::Editing);
    assert!(backend.saves().is_empty());
}

#[tokio::test]
async fn test_failed_discard_keeps_data() {
    let backend = Arc::new(FakeBackend::default());
    *backend.discard_error.lock().unwrap() = Some("storage offline".into());
    let controller = controller(&backend);
    controller
        .set_field("identity", "fullName", json!("Ada"))
        .unwrap();

    let err = controller.discard().await.unwrap_err();
    assert!(matches!(err, ControllerError::Backend(Error::Server(_))));
    assert_eq!(controller.phase(), Phase::Editing);
    assert_eq!(controller.field("identity", "fullName"), Some(json!("Ada")));
    assert!(controller.banner().is_some_and(|b| b.contains("storage offline")));
    controller
        .set_field("identity", "email", json!("ada@steelworks.example"))
        .unwrap();
}
