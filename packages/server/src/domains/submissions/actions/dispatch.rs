//! Dispatch - claim the oldest pending submission and deliver it.
//!
//! # Flow
//!
//! ```text
//! recover_expired_claims()
//!     │
//! find_oldest_pending() ── none ──► NoWork
//!     │
//! conditional_claim() ──── lost ──► NoWork
//!     │
//! staged artifact (re-staged from the row when missing)
//!     │
//! deliver(<id>.<ext>) within delivery_timeout
//!     ├─ confirmed ──► complete_claim(): SUBMITTED → PROCESSING
//!     └─ failed / timed out ──► release_claim(): status untouched, DeliveryFailed
//! ```

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::common::SubmissionId;
use crate::domains::submissions::errors::{SubmissionError, SubmissionResult};
use crate::domains::submissions::models::DispatchClaim;
use crate::kernel::{DeliveryReceipt, ServerDeps};

/// Result of one dispatch trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The submission was delivered and is now PROCESSING
    Dispatched {
        id: SubmissionId,
        receipt: DeliveryReceipt,
    },
    /// Nothing pending, or another dispatch currently holds the claim
    NoWork,
}

/// Run one dispatch trigger.
pub async fn dispatch_next(deps: &ServerDeps) -> SubmissionResult<DispatchOutcome> {
    deps.store
        .recover_expired_claims()
        .await
        .map_err(SubmissionError::store)?;

    let Some(pending) = deps
        .store
        .find_oldest_pending()
        .await
        .map_err(SubmissionError::store)?
    else {
        debug!("No pending submissions");
        return Ok(DispatchOutcome::NoWork);
    };

    let Some(claim) = deps
        .store
        .conditional_claim(pending.id, deps.settings.effective_claim_lease())
        .await
        .map_err(SubmissionError::store)?
    else {
        debug!(submission_id = %pending.id, "Claim lost to a concurrent dispatch");
        return Ok(DispatchOutcome::NoWork);
    };

    info!(submission_id = %claim.submission_id, "Submission claimed for delivery");

    let payload = match load_payload(&claim, deps).await {
        Ok(payload) => payload,
        Err(e) => {
            release(&claim, deps).await;
            return Err(e);
        }
    };

    let id = claim.submission_id;
    let remote_name = deps.staging.artifact_name(id);
    let delivery = tokio::time::timeout(
        deps.settings.delivery_timeout,
        deps.delivery.deliver(&remote_name, payload.as_bytes()),
    )
    .await;

    let receipt = match delivery {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(e)) => {
            warn!(submission_id = %id, error = %e, "Delivery failed");
            release(&claim, deps).await;
            return Err(SubmissionError::DeliveryFailed {
                id,
                reason: format!("{:#}", e),
            });
        }
        Err(_) => {
            warn!(
                submission_id = %id,
                timeout_ms = deps.settings.delivery_timeout.as_millis() as u64,
                "Delivery timed out"
            );
            release(&claim, deps).await;
            return Err(SubmissionError::DeliveryFailed {
                id,
                reason: format!("timed out after {:?}", deps.settings.delivery_timeout),
            });
        }
    };

    match deps.store.complete_claim(&claim, Utc::now()).await {
        Ok(true) => {
            info!(submission_id = %id, bytes = receipt.bytes, "Submission processed");
        }
        Ok(false) => {
            // Someone else moved the row on (status update or lease recovery)
            warn!(submission_id = %id, "Claim no longer held after delivery");
        }
        Err(e) => {
            // The claim stays until its lease expires; the next trigger redelivers
            error!(submission_id = %id, error = %e, "Delivered but failed to record PROCESSING");
            return Err(SubmissionError::store(e));
        }
    }

    Ok(DispatchOutcome::Dispatched { id, receipt })
}

/// Staged artifact for the claim, re-staged from the row when missing.
async fn load_payload(claim: &DispatchClaim, deps: &ServerDeps) -> SubmissionResult<String> {
    let id = claim.submission_id;
    match deps.staging.read(id).await {
        Ok(Some(payload)) => return Ok(payload),
        Ok(None) => warn!(submission_id = %id, "Staged artifact missing, re-staging from store"),
        Err(e) => {
            warn!(submission_id = %id, error = %e, "Staged artifact unreadable, re-staging from store")
        }
    }

    let code = deps
        .store
        .load_code(id)
        .await
        .map_err(SubmissionError::store)?
        .ok_or_else(|| SubmissionError::Staging {
            id,
            source: anyhow::anyhow!("submission row has no code"),
        })?;

    if let Err(e) = deps.staging.write(id, &code).await {
        warn!(submission_id = %id, error = %e, "Re-staging failed, delivering from store copy");
    }

    Ok(code)
}

async fn release(claim: &DispatchClaim, deps: &ServerDeps) {
    if let Err(e) = deps.store.release_claim(claim).await {
        // The lease expiry recovers it on a later trigger
        error!(submission_id = %claim.submission_id, error = %e, "Failed to release claim");
    }
}
