//! Intake - validate and record a new submission.

use tracing::{info, warn};

use crate::common::secret::{MAX_SECRET_LEN, MIN_SECRET_LEN};
use crate::common::{generate_secret, HashedSecret, SubmissionId};
use crate::domains::submissions::errors::{SubmissionError, SubmissionResult};
use crate::domains::submissions::models::NewSubmission;
use crate::kernel::ServerDeps;

pub const MAX_USERNAME_LEN: usize = 64;

/// What the submitter gets back from intake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReceipt {
    /// Store-assigned id ("reservation number")
    pub id: SubmissionId,
    /// Present only when the server generated the secret; shown exactly once
    pub generated_secret: Option<String>,
}

/// Check intake inputs before anything is persisted.
pub fn validate_intake(
    username: &str,
    code: &str,
    secret: Option<&str>,
    max_code_bytes: usize,
) -> SubmissionResult<()> {
    let username = username.trim();
    if username.is_empty() {
        return Err(SubmissionError::validation("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(SubmissionError::validation(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(SubmissionError::validation(
            "username must not contain control characters",
        ));
    }

    if code.trim().is_empty() {
        return Err(SubmissionError::validation("code must not be empty"));
    }
    if code.len() > max_code_bytes {
        return Err(SubmissionError::validation(format!(
            "code must be at most {} bytes",
            max_code_bytes
        )));
    }

    if let Some(secret) = secret {
        let len = secret.chars().count();
        if !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&len) {
            return Err(SubmissionError::validation(format!(
                "secret must be between {} and {} characters",
                MIN_SECRET_LEN, MAX_SECRET_LEN
            )));
        }
    }

    Ok(())
}

/// Record a new submission and stage its payload.
///
/// The row is authoritative: if staging fails after the row is committed the
/// id is still returned, and dispatch re-stages the payload from the row.
pub async fn submit_code(
    username: &str,
    code: &str,
    secret: Option<&str>,
    deps: &ServerDeps,
) -> SubmissionResult<IntakeReceipt> {
    validate_intake(username, code, secret, deps.settings.max_code_bytes)?;

    let (secret, generated_secret) = match secret {
        Some(secret) => (secret.to_string(), None),
        None => {
            let generated = generate_secret();
            (generated.clone(), Some(generated))
        }
    };

    let new = NewSubmission::builder()
        .username(username.trim())
        .code(code)
        .secret(HashedSecret::new(&secret))
        .build();

    let submission = deps
        .store
        .insert(new)
        .await
        .map_err(SubmissionError::store)?;

    if let Err(e) = deps.staging.write(submission.id, code).await {
        warn!(
            submission_id = %submission.id,
            error = %e,
            "failed to stage artifact; dispatch will re-stage from the store"
        );
    }

    info!(submission_id = %submission.id, "Submission received");

    Ok(IntakeReceipt {
        id: submission.id,
        generated_secret,
    })
}
