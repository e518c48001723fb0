//! # Verification Wizard
//!
//! State machine of the multi-step verification form.
//!
//! ```text
//!            advance (valid)            begin_submit (valid, last step)
//!   step i ─────────────────► step i+1     Editing ─────────► Submitting
//!          ◄─────────────────                 ▲                  │    │
//!              retreat                        └── fail_submit ───┘    │ complete_submit
//!                                                                     ▼
//!                                                                 Submitted
//!
//!   Editing ── begin_discard ──► Discarding ── complete_discard ──► Editing (step 0, empty)
//!      ▲                             │
//!      └──────── fail_discard ───────┘
//! ```
//!
//! Step data accumulates across steps and is never dropped by navigation.
//! `revision` counts data changes so callers can tell whether the remote
//! draft is behind.

use crate::draft::{SaveDraftRequest, VerificationDraft};
use crate::verification::{self, Step, StepData, ValidationErrors};
use crate::UserId;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Lifecycle phase of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Editing,
    /// A submission request is outstanding; submit and edits are disabled.
    Submitting,
    /// Terminal: accepted by the backend.
    Submitted,
    /// The remote draft is being deleted; edits are disabled.
    Discarding,
}

/// Reasons a wizard operation is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("already on the final step")]
    AtFinalStep,

    #[error("submission is only possible from the final step")]
    NotAtFinalStep,

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("verification was already submitted")]
    Submitted,

    #[error("the draft is being discarded")]
    DiscardInFlight,
}

/// A step change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Step,
    pub to: Step,
}

/// The form state for one user.
#[derive(Debug, Clone)]
pub struct Wizard {
    owner: UserId,
    step: Step,
    data: StepData,
    phase: Phase,
    banner: Option<String>,
    revision: u64,
    saved_revision: u64,
}

impl Wizard {
    /// Fresh form at the first step.
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            step: Step::Identity,
            data: StepData::new(),
            phase: Phase::Editing,
            banner: None,
            revision: 0,
            saved_revision: 0,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step.index()
    }

    #[must_use]
    pub fn data(&self) -> &StepData {
        &self.data
    }

    /// Fields of one group, if any were entered.
    #[must_use]
    pub fn group(&self, group: &str) -> Option<&BTreeMap<String, Value>> {
        self.data.get(group)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Dismissible error from the last failed submission or discard.
    #[must_use]
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether data changed since the last confirmed save.
    #[must_use]
    pub fn needs_save(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Record that the backend holds `revision`.
    pub fn mark_saved(&mut self, revision: u64) {
        if revision > self.saved_revision && revision <= self.revision {
            self.saved_revision = revision;
        }
    }

    /// Current state as a save-draft body.
    #[must_use]
    pub fn save_request(&self) -> SaveDraftRequest {
        SaveDraftRequest {
            step_index: self.step_index(),
            step_data: self.data.clone(),
        }
    }

    /// Fails unless the form accepts edits.
    pub fn ensure_editable(&self) -> Result<(), WizardError> {
        match self.phase {
            Phase::Editing => Ok(()),
            Phase::Submitting => Err(WizardError::SubmissionInFlight),
            Phase::Submitted => Err(WizardError::Submitted),
            Phase::Discarding => Err(WizardError::DiscardInFlight),
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }

    // =========================================================================
    // EDITING
    // =========================================================================

    /// Set one field value.
    pub fn set_field(
        &mut self,
        group: &str,
        field: &str,
        value: Value,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.data
            .entry(group.to_string())
            .or_default()
            .insert(field.to_string(), value);
        self.touch();
        Ok(())
    }

    /// Merge several fields into a group.
    pub fn merge_group(
        &mut self,
        group: &str,
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.data
            .entry(group.to_string())
            .or_default()
            .extend(fields);
        self.touch();
        Ok(())
    }

    /// Move forward if the current step validates.
    pub fn advance(&mut self) -> Result<Transition, WizardError> {
        self.ensure_editable()?;
        let from = self.step;
        let to = Step::from_index(from.index() + 1).ok_or(WizardError::AtFinalStep)?;
        from.validate(&self.data).map_err(WizardError::Invalid)?;
        self.step = to;
        self.touch();
        Ok(Transition { from, to })
    }

    /// Move back one step without validation. `None` on the first step.
    pub fn retreat(&mut self) -> Result<Option<Transition>, WizardError> {
        self.ensure_editable()?;
        let from = self.step;
        let Some(to) = from.index().checked_sub(1).and_then(Step::from_index) else {
            return Ok(None);
        };
        self.step = to;
        self.touch();
        Ok(Some(Transition { from, to }))
    }

    /// Restore a stored draft. Returns false when the draft was ignored.
    pub fn resume(&mut self, draft: VerificationDraft) -> bool {
        if self.phase != Phase::Editing || !draft.is_owned_by(&self.owner) {
            return false;
        }
        self.step = Step::from_index(draft.clamped_step()).unwrap_or(Step::Identity);
        self.data = draft.step_data;
        self.touch();
        self.saved_revision = self.revision;
        true
    }

    // =========================================================================
    // DISCARD
    // =========================================================================

    /// Enter `Discarding`; edits are refused until the discard ends.
    pub fn begin_discard(&mut self) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.phase = Phase::Discarding;
        Ok(())
    }

    /// The remote draft is gone: forget everything and start over.
    pub fn complete_discard(&mut self) {
        if self.phase != Phase::Discarding {
            return;
        }
        self.phase = Phase::Editing;
        self.step = Step::Identity;
        self.data.clear();
        self.banner = None;
        self.touch();
        self.saved_revision = self.revision;
    }

    /// The discard failed; keep the data and show the error.
    pub fn fail_discard(&mut self, message: impl Into<String>) {
        if self.phase == Phase::Discarding {
            self.phase = Phase::Editing;
            self.banner = Some(message.into());
        }
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Validate the whole form and enter `Submitting`.
    ///
    /// Returns the payload to send. While `Submitting`, a second call fails
    /// with [`WizardError::SubmissionInFlight`].
    pub fn begin_submit(&mut self) -> Result<StepData, WizardError> {
        self.ensure_editable()?;
        if !self.step.is_last() {
            return Err(WizardError::NotAtFinalStep);
        }
        verification::validate_all(&self.data).map_err(WizardError::Invalid)?;
        self.phase = Phase::Submitting;
        self.banner = None;
        Ok(self.data.clone())
    }

    /// The backend accepted the submission.
    pub fn complete_submit(&mut self) {
        if self.phase == Phase::Submitting {
            self.phase = Phase::Submitted;
        }
    }

    /// The submission failed; stay on the final step with a banner.
    pub fn fail_submit(&mut self, message: impl Into<String>) {
        if self.phase == Phase::Submitting {
            self.phase = Phase::Editing;
            self.banner = Some(message.into());
        }
    }

    /// Lock the form because the backend already has a submission on file.
    pub fn lock_submitted(&mut self) {
        self.phase = Phase::Submitted;
    }
}

// =============================================================================
// TESTS
// =============================================================================
