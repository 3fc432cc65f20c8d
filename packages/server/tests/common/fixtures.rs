//! Test fixtures for creating test data.

use std::sync::Arc;

use submission_core::common::{HashedSecret, SubmissionId};
use submission_core::domains::submissions::actions::submit_code;
use submission_core::domains::submissions::models::NewSubmission;
use submission_core::kernel::{ServerDeps, TestDependencies};

pub const TEST_SECRET: &str = "correct-horse-battery";

/// A new submission row with a known secret
pub fn new_submission(username: &str, code: &str) -> NewSubmission {
    NewSubmission::builder()
        .username(username)
        .code(code)
        .secret(HashedSecret::new(TEST_SECRET))
        .build()
}

/// Submit through the intake action with `TEST_SECRET`
pub async fn submit(deps: &ServerDeps, username: &str, code: &str) -> SubmissionId {
    submit_code(username, code, Some(TEST_SECRET), deps)
        .await
        .expect("intake failed")
        .id
}

/// In-memory dependencies plus the `ServerDeps` built from them
pub fn in_memory_deps() -> (TestDependencies, Arc<ServerDeps>) {
    let test_deps = TestDependencies::new();
    let deps = Arc::new(test_deps.server_deps());
    (test_deps, deps)
}
