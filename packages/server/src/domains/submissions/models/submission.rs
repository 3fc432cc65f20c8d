use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{HashedSecret, SubmissionId};

/// Lifecycle of a submission.
///
/// ```text
/// SUBMITTED ──► PROCESSING ──► COMPLETED
///     │              │
///     └──────────────┴───────► FAILED
/// ```
///
/// Transitions only move forward; COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Submitted,
        SubmissionStatus::Processing,
        SubmissionStatus::Completed,
        SubmissionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::Processing => "PROCESSING",
            SubmissionStatus::Completed => "COMPLETED",
            SubmissionStatus::Failed => "FAILED",
        }
    }

    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Submitted, Processing)
                | (Submitted, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored or supplied status string is not a known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid submission status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for SubmissionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(SubmissionStatus::Submitted),
            "PROCESSING" => Ok(SubmissionStatus::Processing),
            "COMPLETED" => Ok(SubmissionStatus::Completed),
            "FAILED" => Ok(SubmissionStatus::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl TryFrom<String> for SubmissionStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Submission - one unit of client code plus its tracked processing state.
///
/// The code payload is not part of this record: it is read
/// from the staged artifact at dispatch time, and only loaded from the store
/// when the artifact has to be re-staged.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Submission {
    pub id: SubmissionId,
    pub username: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    #[serde(skip_serializing)]
    pub secret_salt: String,
    #[sqlx(try_from = "String")]
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the store needs to create a submission row.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewSubmission {
    pub username: String,
    pub code: String,
    pub secret: HashedSecret,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Proof that the caller owns the single in-flight dispatch.
///
/// Only the holder of the matching token can complete or release the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchClaim {
    pub submission_id: SubmissionId,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}
