// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Lifecycle rules (validation, transition legality, claim handling) live in
// domains/submissions/actions and are written against these traits.
//
// Naming convention: Base* for trait names (e.g., BaseSubmissionStore)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::SubmissionId;
use crate::domains::submissions::models::{
    DispatchClaim, NewSubmission, Submission, SubmissionStatus,
};

// =============================================================================
// Submission Store Trait (Infrastructure - durable submission table)
// =============================================================================

#[async_trait]
pub trait BaseSubmissionStore: Send + Sync {
    /// Persist a new submission in SUBMITTED state; the store assigns the id.
    async fn insert(&self, new: NewSubmission) -> Result<Submission>;

    async fn find_by_id(&self, id: SubmissionId) -> Result<Option<Submission>>;

    async fn find_by_username_and_id(
        &self,
        username: &str,
        id: SubmissionId,
    ) -> Result<Option<Submission>>;

    /// Oldest unclaimed SUBMITTED row (by `created_at`, then `id`).
    async fn find_oldest_pending(&self) -> Result<Option<Submission>>;

    /// Read the stored code payload (only needed to re-stage an artifact).
    async fn load_code(&self, id: SubmissionId) -> Result<Option<String>>;

    /// Atomically claim a SUBMITTED row for delivery.
    ///
    /// Returns `None` when the row is no longer pending, is already claimed,
    /// or another submission currently holds the single dispatch claim.
    async fn conditional_claim(
        &self,
        id: SubmissionId,
        lease: Duration,
    ) -> Result<Option<DispatchClaim>>;

    /// Move a claimed row to PROCESSING and drop the claim.
    ///
    /// Returns false when the claim is no longer held by this token.
    async fn complete_claim(&self, claim: &DispatchClaim, at: DateTime<Utc>) -> Result<bool>;

    /// Drop a claim without touching the status.
    async fn release_claim(&self, claim: &DispatchClaim) -> Result<()>;

    /// Clear claims whose lease has expired; returns how many were cleared.
    async fn recover_expired_claims(&self) -> Result<u64>;

    /// Compare-and-set the status: applies only while the row is in `from`.
    async fn update_status(
        &self,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

// =============================================================================
// Artifact Staging Trait (Infrastructure - local side channel for payloads)
// =============================================================================

#[async_trait]
pub trait BaseArtifactStaging: Send + Sync {
    /// Name of the artifact for a submission (also the remote file name).
    fn artifact_name(&self, id: SubmissionId) -> String;

    /// Write (or overwrite) the staged artifact for a submission
    async fn write(&self, id: SubmissionId, content: &str) -> Result<()>;

    /// Read the staged artifact, `None` if it was never staged
    async fn read(&self, id: SubmissionId) -> Result<Option<String>>;
}

// =============================================================================
// Remote Delivery Trait (Infrastructure - file transfer to external store)
// =============================================================================

/// Confirmation returned by a delivery channel after a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub remote_name: String,
    pub bytes: u64,
}

#[async_trait]
pub trait BaseRemoteDelivery: Send + Sync {
    /// Connect, upload `bytes` as `name`, and disconnect.
    ///
    /// Ok only once the remote side confirmed the whole transfer.
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<DeliveryReceipt>;
}
