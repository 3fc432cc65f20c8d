//! Status updater - explicit transitions requested by trusted callers.

use chrono::Utc;
use tracing::{info, warn};

use crate::common::SubmissionId;
use crate::domains::submissions::errors::{SubmissionError, SubmissionResult};
use crate::domains::submissions::models::SubmissionStatus;
use crate::kernel::ServerDeps;

/// Move a submission to `next`, rejecting transitions the lifecycle forbids.
///
/// The write is a compare-and-set on the status that was validated. Losing a
/// race re-reads and re-validates; statuses only move forward, so this ends
/// after at most as many rounds as there are states.
pub async fn update_submission_status(
    id: SubmissionId,
    next: SubmissionStatus,
    deps: &ServerDeps,
) -> SubmissionResult<()> {
    for _ in 0..=SubmissionStatus::ALL.len() {
        let current = deps
            .store
            .find_by_id(id)
            .await
            .map_err(SubmissionError::store)?
            .ok_or(SubmissionError::NotFound(id))?;

        if !current.status.can_transition_to(next) {
            warn!(
                submission_id = %id,
                from = %current.status,
                to = %next,
                "Rejected illegal status transition"
            );
            return Err(SubmissionError::IllegalTransition {
                from: current.status,
                to: next,
            });
        }

        let applied = deps
            .store
            .update_status(id, current.status, next, Utc::now())
            .await
            .map_err(SubmissionError::store)?;

        if applied {
            info!(submission_id = %id, from = %current.status, to = %next, "Submission status updated");
            return Ok(());
        }
    }

    Err(SubmissionError::store(anyhow::anyhow!(
        "status of submission {} kept changing during update",
        id
    )))
}
