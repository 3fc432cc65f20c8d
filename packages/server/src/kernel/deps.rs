//! Server dependencies for lifecycle actions (using traits for testability)
//!
//! This module provides the central dependency container passed to every
//! submission action. All external services use trait abstractions so tests
//! can swap in the in-memory doubles from `test_dependencies`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::kernel::{BaseArtifactStaging, BaseRemoteDelivery, BaseSubmissionStore};

/// Tunables for intake validation and dispatch.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Upper bound on one whole delivery; exceeding it counts as a failure
    pub delivery_timeout: Duration,
    /// How long a dispatch claim is honoured before it can be recovered
    pub claim_lease: Duration,
    /// Bound on one store round trip, used to size the lease floor
    pub store_timeout: Duration,
    pub max_code_bytes: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(30),
            claim_lease: Duration::from_secs(120),
            store_timeout: Duration::from_secs(5),
            max_code_bytes: 1024 * 1024,
        }
    }
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delivery_timeout: config.delivery_timeout,
            claim_lease: config.claim_lease,
            store_timeout: config.store_timeout,
            max_code_bytes: config.max_code_bytes,
        }
    }

    /// Shortest lease that outlives a full delivery plus recording its outcome.
    pub fn min_claim_lease(&self) -> Duration {
        self.delivery_timeout + self.store_timeout + LEASE_GRACE
    }

    /// The configured lease, raised to `min_claim_lease` when shorter.
    ///
    /// A lease that expires mid-delivery would let the next trigger recover
    /// and re-claim a row that is still being uploaded.
    pub fn effective_claim_lease(&self) -> Duration {
        self.claim_lease.max(self.min_claim_lease())
    }
}

const LEASE_GRACE: Duration = Duration::from_secs(1);


/// Server dependencies accessible to actions
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseSubmissionStore>,
    pub staging: Arc<dyn BaseArtifactStaging>,
    pub delivery: Arc<dyn BaseRemoteDelivery>,
    pub settings: LifecycleSettings,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        store: Arc<dyn BaseSubmissionStore>,
        staging: Arc<dyn BaseArtifactStaging>,
        delivery: Arc<dyn BaseRemoteDelivery>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            staging,
            delivery,
            settings,
        }
    }
}
