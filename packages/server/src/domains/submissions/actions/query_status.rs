//! Status query - credential-checked read of a submission's state.

use tracing::{debug, info};

use crate::common::{verify_secret, SubmissionId};
use crate::domains::submissions::errors::{SubmissionError, SubmissionResult};
use crate::domains::submissions::models::SubmissionStatus;
use crate::kernel::ServerDeps;

/// Current status of `(username, id)`, provided `secret` matches.
///
/// Only the status leaves this function; the code and secret never do.
pub async fn fetch_submission_status(
    username: &str,
    id: SubmissionId,
    secret: &str,
    deps: &ServerDeps,
) -> SubmissionResult<SubmissionStatus> {
    let submission = deps
        .store
        .find_by_username_and_id(username.trim(), id)
        .await
        .map_err(SubmissionError::store)?
        .ok_or(SubmissionError::NotFound(id))?;

    if !verify_secret(secret, &submission.secret_salt, &submission.secret_hash) {
        debug!(submission_id = %id, "Status query rejected: secret mismatch");
        return Err(SubmissionError::Unauthorized);
    }

    info!(submission_id = %id, status = %submission.status, "Submission result fetched");
    Ok(submission.status)
}
