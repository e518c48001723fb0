//! # Verification Controller
//!
//! Drives a [`Wizard`] against a [`VerificationBackend`]:
//! - step changes fire a draft save in the background; the step change
//!   itself never waits for the network
//! - saves retry transient failures on a bounded [`Backoff`], and an older
//!   save never retries once a newer one has started
//! - submission is single-flight
//! - submit and discard halt autosave and wait for in-flight saves, so no
//!   save reaches the backend after either request
//!
//! Wizard state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`.

use crate::{
    DocumentRef, DocumentUpload, Error, ReviewState, SubmissionReceipt, VerificationBackend,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use surplus_core::{
    AutosaveStatus, AutosaveTracker, Backoff, Phase, SaveDraftRequest, Step, StepData, Transition,
    UserId, Wizard, WizardError,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Errors surfaced by controller operations that touch the backend.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Backend(#[from] Error),
}

/// What [`VerificationController::resume`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No usable draft; the form starts at the first step.
    Fresh,
    /// A draft was restored.
    Resumed { step: Step },
    /// A submission is already on file; the form is read-only.
    Locked(ReviewState),
}

struct State {
    wizard: Wizard,
    autosave: AutosaveTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-step supplier verification form bound to a backend.
pub struct VerificationController {
    backend: Arc<dyn VerificationBackend>,
    state: Arc<Mutex<State>>,
    backoff: Backoff,
    pending: Mutex<JoinSet<()>>,
    /// Bumped to wake and stop save jobs waiting out a backoff delay.
    halt: watch::Sender<u64>,
}

impl VerificationController {
    pub fn new(backend: Arc<dyn VerificationBackend>, owner: UserId) -> Self {
        let (halt, _) = watch::channel(0);
        Self {
            backend,
            state: Arc::new(Mutex::new(State {
                wizard: Wizard::new(owner),
                autosave: AutosaveTracker::new(),
            })),
            backoff: Backoff::default(),
            pending: Mutex::new(JoinSet::new()),
            halt,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    #[must_use]
    pub fn step(&self) -> Step {
        lock(&self.state).wizard.step()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.state).wizard.phase()
    }

    /// Copy of everything entered so far.
    #[must_use]
    pub fn data(&self) -> StepData {
        lock(&self.state).wizard.data().clone()
    }

    /// One field value, if set.
    #[must_use]
    pub fn field(&self, group: &str, field: &str) -> Option<Value> {
        lock(&self.state)
            .wizard
            .group(group)
            .and_then(|g| g.get(field))
            .cloned()
    }

    #[must_use]
    pub fn banner(&self) -> Option<String> {
        lock(&self.state).wizard.banner().map(str::to_string)
    }

    pub fn dismiss_banner(&self) {
        lock(&self.state).wizard.dismiss_banner();
    }

    #[must_use]
    pub fn autosave_status(&self) -> AutosaveStatus {
        lock(&self.state).autosave.status()
    }

    /// Whether edits exist that no save has confirmed yet.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        lock(&self.state).wizard.needs_save()
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Restore the current user's draft, or lock the form when a submission
    /// is already under review.
    ///
    /// A failing status lookup is logged and the draft is loaded anyway.
    pub async fn resume(&self) -> Result<ResumeOutcome, ControllerError> {
        match self.backend.verification_status().await {
            Ok(status) if status.status.is_locked() => {
                lock(&self.state).wizard.lock_submitted();
                info!(state = ?status.status, "verification already submitted");
                return Ok(ResumeOutcome::Locked(status.status));
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "verification status lookup failed"),
        }

        let Some(draft) = self.backend.load_draft().await? else {
            return Ok(ResumeOutcome::Fresh);
        };

        let mut state = lock(&self.state);
        if state.wizard.resume(draft) {
            let step = state.wizard.step();
            debug!(step = %step, "draft restored");
            Ok(ResumeOutcome::Resumed { step })
        } else {
            warn!(owner = %state.wizard.owner(), "ignoring draft owned by another user");
            Ok(ResumeOutcome::Fresh)
        }
    }

    // =========================================================================
    // EDITING
    // =========================================================================

    pub fn set_field(&self, group: &str, field: &str, value: Value) -> Result<(), WizardError> {
        lock(&self.state).wizard.set_field(group, field, value)
    }

    pub fn merge_group(
        &self,
        group: &str,
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<(), WizardError> {
        lock(&self.state).wizard.merge_group(group, fields)
    }

    /// Validate the current step and move forward; saves in the background.
    pub fn advance(&self) -> Result<Transition, WizardError> {
        let mut state = lock(&self.state);
        let transition = state.wizard.advance()?;
        self.schedule_save(&mut state);
        Ok(transition)
    }

    /// Move back one step; saves in the background when the step changed.
    pub fn retreat(&self) -> Result<Option<Transition>, WizardError> {
        let mut state = lock(&self.state);
        let transition = state.wizard.retreat()?;
        if transition.is_some() {
            self.schedule_save(&mut state);
        }
        Ok(transition)
    }


    /// Upload a document and record its reference in the documents group.
    pub async fn attach_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<DocumentRef, ControllerError> {
        lock(&self.state).wizard.ensure_editable()?;
        let field = upload.document_type.field();
        let reference = self.backend.upload_document(upload).await?;
        self.set_field(
            Step::Documents.group(),
            field,
            json!({ "id": reference.id, "url": reference.url }),
        )?;
        Ok(reference)
    }

    // =========================================================================
    // AUTOSAVE
    // =========================================================================

    /// Save if anything changed since the last confirmed save.
    pub fn autosave_tick(&self) -> bool {
        let mut state = lock(&self.state);
        if state.wizard.phase() != Phase::Editing || !state.wizard.needs_save() {
            return false;
        }
        if matches!(state.autosave.status(), AutosaveStatus::Saving { .. }) {
            return false;
        }
        self.schedule_save(&mut state);
        true
    }

    /// Call [`autosave_tick`](Self::autosave_tick) every `every` until the
    /// controller is dropped or the form is submitted.
    pub fn spawn_autosave_timer(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                if controller.phase() == Phase::Submitted {
                    break;
                }
                controller.autosave_tick();
            }
        })
    }

    /// Wait for every background save, including retries, to finish.
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.pending));
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "autosave task ended abnormally");
                }
            }
        }
    }

    fn schedule_save(&self, state: &mut State) {
        let job = SaveJob {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            backoff: self.backoff,
            generation: state.autosave.begin(),
            revision: state.wizard.revision(),
            request: state.wizard.save_request(),
            halted: self.halt.subscribe(),
        };
        let mut pending = lock(&self.pending);
        while pending.try_join_next().is_some() {}
        pending.spawn(job.run());
    }

    /// Stop every outstanding save from retrying, then wait for the ones
    /// already on the wire.
    async fn quiesce(&self) {
        lock(&self.state).autosave.cancel();
        self.halt.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        self.settle().await;
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Submit the whole form from the final step.
    ///
    /// A second call while the first is in flight fails with
    /// [`WizardError::SubmissionInFlight`] and sends nothing. A backend
    /// failure keeps the data and shows it in the banner.
    pub async fn submit(&self) -> Result<SubmissionReceipt, ControllerError> {
        let payload = lock(&self.state).wizard.begin_submit()?;
        self.quiesce().await;

        match self.backend.submit_verification(&payload).await {
            Ok(receipt) => {
                lock(&self.state).wizard.complete_submit();
                info!(submission = %receipt.submission_id, "verification submitted");
                Ok(receipt)
            }
            Err(err) => {
                warn!(error = %err, "verification submission failed");
                lock(&self.state).wizard.fail_submit(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Delete the remote draft and start over at the first step.
    ///
    /// Edits are refused with [`WizardError::DiscardInFlight`] until the
    /// backend answers. A failure keeps the data and shows the banner.
    pub async fn discard(&self) -> Result<(), ControllerError> {
        lock(&self.state).wizard.begin_discard()?;
        self.quiesce().await;

        if let Err(err) = self.backend.discard_draft().await {
            warn!(error = %err, "draft discard failed");
            lock(&self.state).wizard.fail_discard(err.to_string());
            return Err(err.into());
        }

        let mut state = lock(&self.state);
        state.wizard.complete_discard();
        state.autosave = AutosaveTracker::new();
        info!("verification draft discarded");
        Ok(())
    }
}

// =============================================================================
// BACKGROUND SAVE
// =============================================================================

struct SaveJob {
    backend: Arc<dyn VerificationBackend>,
    state: Arc<Mutex<State>>,
    backoff: Backoff,
    generation: u64,
    revision: u64,
    request: SaveDraftRequest,
    halted: watch::Receiver<u64>,
}

impl SaveJob {
    async fn run(mut self) {
        let mut retry = 0u32;
        loop {
            if lock(&self.state).wizard.phase() != Phase::Editing {
                debug!(
                    generation = self.generation,
                    "draft autosave dropped, form not editable"
                );
                return;
            }
            match self.backend.save_draft(&self.request).await {
                Ok(draft) => {
                    let mut state = lock(&self.state);
                    state.wizard.mark_saved(self.revision);
                    if state.autosave.record_success(self.generation, draft.last_saved_at) {
                        debug!(generation = self.generation, "draft saved");
                    }
                    return;
                }
                Err(err) => {
                    let delay = lock(&self.state).autosave.record_failure(
                        self.generation,
                        retry,
                        err.is_transient(),
                        &self.backoff,
                    );
                    let Some(delay) = delay else {
                        warn!(generation = self.generation, error = %err, "draft autosave abandoned");
                        return;
                    };
                    warn!(
                        generation = self.generation,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "draft autosave failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = self.halted.changed() => {
                            debug!(generation = self.generation, "draft autosave halted");
                            return;
                        }
                    }
                    retry = retry.saturating_add(1);
                }
            }
        }
    }
}
