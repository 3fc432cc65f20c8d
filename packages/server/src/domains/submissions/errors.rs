use thiserror::Error;

use super::models::SubmissionStatus;
use crate::common::SubmissionId;

/// Failures of the submission lifecycle operations.
///
/// "No pending work" is not an error; see `DispatchOutcome::NoWork`.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("submission store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("staged artifact unavailable for submission {id}")]
    Staging {
        id: SubmissionId,
        #[source]
        source: anyhow::Error,
    },

    #[error("delivery of submission {id} failed: {reason}")]
    DeliveryFailed { id: SubmissionId, reason: String },

    #[error("submission {0} not found")]
    NotFound(SubmissionId),

    #[error("unauthorized")]
    Unauthorized,

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
}

impl SubmissionError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        SubmissionError::StoreUnavailable(err.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SubmissionError::Validation(message.into())
    }

    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionError::StoreUnavailable(_)
                | SubmissionError::Staging { .. }
                | SubmissionError::DeliveryFailed { .. }
        )
    }
}

pub type SubmissionResult<T> = std::result::Result<T, SubmissionError>;
