//! # Supplier Verification
//!
//! The six steps of supplier verification, their field groups and the
//! validation run before a step may be left forward.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Accumulated form data: field group -> field -> value.
pub type StepData = BTreeMap<String, BTreeMap<String, Value>>;

/// A verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Identity,
    BankAccount,
    BusinessDetails,
    OperationalInfo,
    Documents,
    Review,
}

impl Step {
    /// Steps in order; the index in this array is the step index.
    pub const ALL: [Step; 6] = [
        Step::Identity,
        Step::BankAccount,
        Step::BusinessDetails,
        Step::OperationalInfo,
        Step::Documents,
        Step::Review,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[must_use]
    pub fn from_index(index: usize) -> Option<Step> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn is_last(self) -> bool {
        self.index() + 1 == Self::COUNT
    }

    /// Field group this step writes into.
    #[must_use]
    pub fn group(self) -> &'static str {
        match self {
            Step::Identity => "identity",
            Step::BankAccount => "bankAccount",
            Step::BusinessDetails => "businessDetails",
            Step::OperationalInfo => "operationalInfo",
            Step::Documents => "documents",
            Step::Review => "review",
        }
    }

    /// Fields that must be present to leave this step forward.
    #[must_use]
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Step::Identity => &["fullName", "email", "phone", "nationalIdNumber"],
            Step::BankAccount => &["accountHolderName", "accountNumber", "bankName", "routingCode"],
            Step::BusinessDetails => &["legalName", "registrationNumber", "taxId", "businessAddress"],
            Step::OperationalInfo => &["warehouseAddress", "productCategories", "monthlyVolume"],
            Step::Documents => &["businessLicense", "taxCertificate", "bankStatement"],
            Step::Review => &["confirmAccuracy"],
        }
    }

    /// Validate this step's group inside `data`.
    pub fn validate(self, data: &StepData) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let group = data.get(self.group());

        for field in self.required_fields() {
            let value = group.and_then(|g| g.get(*field));
            match value {
                Some(v) if is_present(v) => {
                    if let Some(message) = check_format(self, field, v) {
                        errors.push(self.group(), field, message);
                    }
                }
                _ => errors.push(self.group(), field, "is required"),
            }
        }

        errors.into_result()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group())
    }
}

/// Validate every step, collecting all errors.
pub fn validate_all(data: &StepData) -> Result<(), ValidationErrors> {
    let mut all = ValidationErrors::default();
    for step in Step::ALL {
        if let Err(errors) = step.validate(data) {
            all.errors.extend(errors.errors);
        }
    }
    all.into_result()
}

// =============================================================================
// VALIDATION ERRORS
// =============================================================================

/// A single invalid field, shown inline next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub group: String,
    pub field: String,
    pub message: String,
}

/// Non-empty list of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{} invalid field(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, group: &str, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            group: group.to_string(),
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Error for a specific field, if any.
    #[must_use]
    pub fn for_field(&self, group: &str, field: &str) -> Option<&FieldError> {
        self.errors
            .iter()
            .find(|e| e.group == group && e.field == field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// FIELD RULES
// =============================================================================

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn check_format(step: Step, field: &str, value: &Value) -> Option<&'static str> {
    match (step, field) {
        (Step::Identity, "email") => match value.as_str() {
            Some(s) if is_email(s) => None,
            _ => Some("must be a valid email address"),
        },
        (Step::Identity, "phone") => match value.as_str() {
            Some(s) if is_phone(s) => None,
            _ => Some("must be a valid phone number"),
        },
        (Step::BankAccount, "accountNumber") => {
            let digits = match value {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) if n.is_u64() => Some(n.to_string()),
                _ => None,
            };
            match digits {
                Some(d) if (6..=20).contains(&d.len()) && d.bytes().all(|b| b.is_ascii_digit()) => {
                    None
                }
                _ => Some("must be 6 to 20 digits"),
            }
        }
        (Step::OperationalInfo, "productCategories") => match value.as_array() {
            Some(items) if !items.is_empty() => None,
            _ => Some("must list at least one category"),
        },
        (Step::OperationalInfo, "monthlyVolume") => {
            let volume = match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            match volume {
                Some(v) if v > 0 => None,
                _ => Some("must be a positive whole number"),
            }
        }
        (Step::Documents, _) => {
            let has_url = value
                .get("url")
                .and_then(Value::as_str)
                .is_some_and(|u| !u.trim().is_empty());
            if has_url {
                None
            } else {
                Some("must be an uploaded document")
            }
        }
        (Step::Review, "confirmAccuracy") => {
            if value.as_bool() == Some(true) {
                None
            } else {
                Some("must be confirmed")
            }
        }
        _ => None,
    }
}

fn is_email(s: &str) -> bool {
    let s = s.trim();
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(head, tail)| !head.is_empty() && !tail.is_empty() && !tail.ends_with('.'))
}

fn is_phone(s: &str) -> bool {
    let allowed = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    let digits = s.chars().filter(char::is_ascii_digit).count();
    allowed && digits >= 7
}

// =============================================================================
// TESTS
// =============================================================================
