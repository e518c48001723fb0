//! # Verification Draft
//!
//! Wire shapes of the partially completed verification form as stored by the
//! backend.

use crate::verification::{Step, StepData};
use crate::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A stored draft, as echoed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDraft {
    pub owner_user_id: UserId,
    pub step_index: usize,
    #[serde(default)]
    pub step_data: StepData,
    #[serde(default)]
    pub last_saved_at: Timestamp,
}

impl VerificationDraft {
    /// Step index clamped into the valid range.
    #[must_use]
    pub fn clamped_step(&self) -> usize {
        self.step_index.min(Step::COUNT - 1)
    }

    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_user_id == user
    }
}

/// Body of a save-draft request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftRequest {
    pub step_index: usize,
    pub step_data: StepData,
}
