// TestDependencies - in-memory implementations for testing
//
// Provides stand-ins for the store, the staging area and the delivery channel
// that can be injected into ServerDeps for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    BaseArtifactStaging, BaseRemoteDelivery, BaseSubmissionStore, DeliveryReceipt,
    LifecycleSettings, ServerDeps,
};
use crate::common::SubmissionId;
use crate::domains::submissions::models::{
    DispatchClaim, NewSubmission, Submission, SubmissionStatus,
};

// =============================================================================
// In-Memory Submission Store
// =============================================================================

struct MemoryRow {
    submission: Submission,
    code: String,
    claim: Option<(Uuid, DateTime<Utc>)>,
}

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    rows: BTreeMap<SubmissionId, MemoryRow>,
}

/// Submission store held in process memory.
///
/// Each operation runs entirely under one mutex, which gives the same
/// single-claim guarantees the Postgres store gets from its conditional
/// updates and unique index.
#[derive(Default)]
pub struct InMemorySubmissionStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn status_of(&self, id: SubmissionId) -> Option<SubmissionStatus> {
        let state = self.state.lock().unwrap();
        state.rows.get(&id).map(|row| row.submission.status)
    }

    pub fn get(&self, id: SubmissionId) -> Option<Submission> {
        let state = self.state.lock().unwrap();
        state.rows.get(&id).map(|row| row.submission.clone())
    }

    pub fn is_claimed(&self, id: SubmissionId) -> bool {
        let state = self.state.lock().unwrap();
        state
            .rows
            .get(&id)
            .map(|row| row.claim.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("connection refused (simulated)");
        }
        Ok(())
    }
}

#[async_trait]
impl BaseSubmissionStore for InMemorySubmissionStore {
    async fn insert(&self, new: NewSubmission) -> Result<Submission> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.last_id += 1;
        let id = SubmissionId::new(state.last_id);
        let submission = Submission {
            id,
            username: new.username,
            secret_hash: new.secret.hash,
            secret_salt: new.secret.salt,
            status: SubmissionStatus::Submitted,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        state.rows.insert(
            id,
            MemoryRow {
                submission: submission.clone(),
                code: new.code,
                claim: None,
            },
        );
        Ok(submission)
    }

    async fn find_by_id(&self, id: SubmissionId) -> Result<Option<Submission>> {
        self.check_available()?;
        Ok(self.get(id))
    }

    async fn find_by_username_and_id(
        &self,
        username: &str,
        id: SubmissionId,
    ) -> Result<Option<Submission>> {
        self.check_available()?;
        Ok(self.get(id).filter(|s| s.username == username))
    }

    async fn find_oldest_pending(&self) -> Result<Option<Submission>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let oldest = state
            .rows
            .values()
            .filter(|row| row.submission.status == SubmissionStatus::Submitted)
            .filter(|row| row.claim.is_none())
            .min_by_key(|row| (row.submission.created_at, row.submission.id))
            .map(|row| row.submission.clone());
        Ok(oldest)
    }

    async fn load_code(&self, id: SubmissionId) -> Result<Option<String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state.rows.get(&id).map(|row| row.code.clone()))
    }

    async fn conditional_claim(
        &self,
        id: SubmissionId,
        lease: Duration,
    ) -> Result<Option<DispatchClaim>> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if state.rows.values().any(|row| row.claim.is_some()) {
            return Ok(None);
        }
        let Some(row) = state.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.submission.status != SubmissionStatus::Submitted {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let expires_at = Utc::now() + chrono::Duration::from_std(lease)?;
        row.claim = Some((token, expires_at));
        Ok(Some(DispatchClaim {
            submission_id: id,
            token,
            expires_at,
        }))
    }

    async fn complete_claim(&self, claim: &DispatchClaim, at: DateTime<Utc>) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let Some(row) = state.rows.get_mut(&claim.submission_id) else {
            return Ok(false);
        };
        let holds_claim = matches!(row.claim, Some((token, _)) if token == claim.token);
        if !holds_claim || row.submission.status != SubmissionStatus::Submitted {
            return Ok(false);
        }
        row.submission.status = SubmissionStatus::Processing;
        row.submission.updated_at = at.max(row.submission.updated_at);
        row.claim = None;
        Ok(true)
    }

    async fn release_claim(&self, claim: &DispatchClaim) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.rows.get_mut(&claim.submission_id) {
            if matches!(row.claim, Some((token, _)) if token == claim.token) {
                row.claim = None;
            }
        }
        Ok(())
    }

    async fn recover_expired_claims(&self) -> Result<u64> {
        self.check_available()?;
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let mut recovered = 0;
        for row in state.rows.values_mut() {
            if matches!(row.claim, Some((_, expires_at)) if expires_at < now) {
                row.claim = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn update_status(
        &self,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let Some(row) = state.rows.get_mut(&id) else {
            return Ok(false);
        };
        if row.submission.status != from {
            return Ok(false);
        }
        row.submission.status = to;
        row.submission.updated_at = at.max(row.submission.updated_at);
        row.claim = None;
        Ok(true)
    }
}

// =============================================================================
// In-Memory Artifact Staging
// =============================================================================

pub struct InMemoryArtifactStaging {
    extension: String,
    artifacts: Mutex<HashMap<SubmissionId, String>>,
    fail_writes: AtomicBool,
}

impl Default for InMemoryArtifactStaging {
    fn default() -> Self {
        Self::new("py")
    }
}

impl InMemoryArtifactStaging {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            artifacts: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Drop a staged artifact (simulates a lost local file)
    pub fn remove(&self, id: SubmissionId) {
        self.artifacts.lock().unwrap().remove(&id);
    }

    pub fn get(&self, id: SubmissionId) -> Option<String> {
        self.artifacts.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl BaseArtifactStaging for InMemoryArtifactStaging {
    fn artifact_name(&self, id: SubmissionId) -> String {
        format!("{}.{}", id, self.extension)
    }

    async fn write(&self, id: SubmissionId, content: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk full (simulated)");
        }
        self.artifacts
            .lock()
            .unwrap()
            .insert(id, content.to_string());
        Ok(())
    }

    async fn read(&self, id: SubmissionId) -> Result<Option<String>> {
        Ok(self.get(id))
    }
}

// =============================================================================
// Recording Delivery Channel
// =============================================================================

/// How the recording delivery channel answers the next uploads
#[derive(Debug, Clone)]
pub enum DeliveryBehavior {
    Succeed,
    Fail(String),
    /// Wait this long before succeeding
    Delay(Duration),
}

/// An upload the recording channel accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub name: String,
    pub body: Vec<u8>,
}

pub struct RecordingDelivery {
    behavior: Mutex<DeliveryBehavior>,
    uploads: Mutex<Vec<RecordedUpload>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for RecordingDelivery {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(DeliveryBehavior::Succeed),
            uploads: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        let delivery = Self::new();
        delivery.set_behavior(DeliveryBehavior::Fail(reason.to_string()));
        delivery
    }

    pub fn set_behavior(&self, behavior: DeliveryBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Uploads that completed successfully, in order
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// Every call to `deliver`, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of deliveries that were ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Deliveries running right now
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BaseRemoteDelivery for RecordingDelivery {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<DeliveryReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        // Decrements even when a timeout drops this future mid-delay
        let _in_flight = InFlightGuard(&self.in_flight);

        let behavior = self.behavior.lock().unwrap().clone();
        let result = match behavior {
            DeliveryBehavior::Succeed => Ok(()),
            DeliveryBehavior::Fail(reason) => Err(anyhow!(reason)),
            DeliveryBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        };

        result?;

        self.uploads.lock().unwrap().push(RecordedUpload {
            name: name.to_string(),
            body: bytes.to_vec(),
        });
        Ok(DeliveryReceipt {
            remote_name: name.to_string(),
            bytes: bytes.len() as u64,
        })
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// In-memory dependencies plus typed handles for assertions
pub struct TestDependencies {
    pub store: Arc<InMemorySubmissionStore>,
    pub staging: Arc<InMemoryArtifactStaging>,
    pub delivery: Arc<RecordingDelivery>,
    pub settings: LifecycleSettings,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemorySubmissionStore::new()),
            staging: Arc::new(InMemoryArtifactStaging::default()),
            delivery: Arc::new(RecordingDelivery::new()),
            settings: LifecycleSettings {
                delivery_timeout: Duration::from_secs(2),
                claim_lease: Duration::from_secs(60),
                store_timeout: Duration::from_secs(5),
                max_code_bytes: 64 * 1024,
            },
        }
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.staging.clone(),
            self.delivery.clone(),
            self.settings.clone(),
        )
    }
}
