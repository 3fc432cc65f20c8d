//! Lifecycle tests against the in-memory dependencies.
//!
//! Covers intake, dispatch (ordering, single claim, failure handling),
//! status updates and credential-checked status queries.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crate::common::{in_memory_deps, submit, TEST_SECRET};
use submission_core::common::SubmissionId;
use submission_core::domains::submissions::actions::{
    dispatch_next, fetch_submission_status, submit_code, update_submission_status,
    DispatchOutcome,
};
use submission_core::domains::submissions::{SubmissionError, SubmissionStatus};
use submission_core::kernel::test_dependencies::DeliveryBehavior;
use submission_core::kernel::{BaseSubmissionStore, LifecycleSettings, TestDependencies};

// =============================================================================
// Intake
// =============================================================================

#[tokio::test]
async fn intake_assigns_increasing_ids_in_submitted_state() {
    let (test_deps, deps) = in_memory_deps();

    let mut previous: Option<SubmissionId> = None;
    for n in 0..5 {
        let id = submit(&deps, "alice", &format!("print({})", n)).await;
        if let Some(prev) = previous {
            assert!(id > prev, "{id} should be greater than {prev}");
        }
        assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Submitted));
        previous = Some(id);
    }
}

#[tokio::test]
async fn intake_stages_the_submitted_code() {
    let (test_deps, deps) = in_memory_deps();

    let id = submit(&deps, "alice", "print(1)").await;

    assert_eq!(test_deps.staging.get(id).as_deref(), Some("print(1)"));
}

#[tokio::test]
async fn intake_generates_a_secret_when_none_is_supplied() {
    let (_test_deps, deps) = in_memory_deps();

    let receipt = submit_code("alice", "print(1)", None, &deps).await.unwrap();
    let secret = receipt.generated_secret.expect("secret should be generated");

    let status = fetch_submission_status("alice", receipt.id, &secret, &deps)
        .await
        .unwrap();
    assert_eq!(status, SubmissionStatus::Submitted);
}

#[tokio::test]
async fn intake_with_supplied_secret_returns_no_secret() {
    let (_test_deps, deps) = in_memory_deps();

    let receipt = submit_code("alice", "print(1)", Some(TEST_SECRET), &deps)
        .await
        .unwrap();

    assert!(receipt.generated_secret.is_none());
}

#[tokio::test]
async fn intake_rejects_invalid_input_without_writing() {
    let (test_deps, deps) = in_memory_deps();

    let err = submit_code("", "print(1)", None, &deps).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(_)));

    let err = submit_code("alice", "", None, &deps).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(_)));

    let too_big = "x".repeat(deps.settings.max_code_bytes + 1);
    let err = submit_code("alice", &too_big, None, &deps).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(_)));

    assert!(test_deps.store.is_empty());
}

#[tokio::test]
async fn intake_reports_store_unavailable() {
    let (test_deps, deps) = in_memory_deps();
    test_deps.store.set_unavailable(true);

    let err = submit_code("alice", "print(1)", None, &deps).await.unwrap_err();

    assert!(matches!(err, SubmissionError::StoreUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn intake_succeeds_when_staging_fails() {
    let (test_deps, deps) = in_memory_deps();
    test_deps.staging.set_fail_writes(true);

    let id = submit(&deps, "alice", "print(1)").await;

    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Submitted));
    assert!(test_deps.staging.get(id).is_none());
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn dispatch_with_nothing_pending_returns_no_work() {
    let (test_deps, deps) = in_memory_deps();

    let outcome = dispatch_next(&deps).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::NoWork);
    assert_eq!(test_deps.delivery.attempts(), 0);
    assert!(test_deps.store.is_empty());
}

#[tokio::test]
async fn dispatch_with_only_processed_rows_mutates_nothing() {
    let (test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print(1)").await;
    dispatch_next(&deps).await.unwrap();
    let before = test_deps.store.get(id).unwrap();

    let outcome = dispatch_next(&deps).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::NoWork);
    let after = test_deps.store.get(id).unwrap();
    assert_eq!(after.status, SubmissionStatus::Processing);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(test_deps.delivery.attempts(), 1);
}

#[tokio::test]
async fn dispatch_claims_only_the_oldest_submission() {
    let (test_deps, deps) = in_memory_deps();
    let first = submit(&deps, "alice", "print('first')").await;
    let second = submit(&deps, "bob", "print('second')").await;

    let outcome = dispatch_next(&deps).await.unwrap();

    match outcome {
        DispatchOutcome::Dispatched { id, .. } => assert_eq!(id, first),
        other => panic!("expected a dispatch, got {other:?}"),
    }
    assert_eq!(test_deps.store.status_of(first), Some(SubmissionStatus::Processing));
    assert_eq!(test_deps.store.status_of(second), Some(SubmissionStatus::Submitted));

    let uploads = test_deps.delivery.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, format!("{}.py", first));
}

#[tokio::test]
async fn successive_dispatches_follow_creation_order() {
    let (test_deps, deps) = in_memory_deps();
    let ids = vec![
        submit(&deps, "alice", "a").await,
        submit(&deps, "bob", "b").await,
        submit(&deps, "carol", "c").await,
    ];

    let mut dispatched = Vec::new();
    while let DispatchOutcome::Dispatched { id, .. } = dispatch_next(&deps).await.unwrap() {
        dispatched.push(id);
    }

    assert_eq!(dispatched, ids);
    let bodies: Vec<Vec<u8>> = test_deps
        .delivery
        .uploads()
        .into_iter()
        .map(|upload| upload.body)
        .collect();
    assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn concurrent_triggers_claim_a_single_submission_once() {
    let (test_deps, deps) = in_memory_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Delay(Duration::from_millis(100)));
    let id = submit(&deps, "alice", "print(1)").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let deps = Arc::clone(&deps);
            tokio::spawn(async move { dispatch_next(&deps).await })
        })
        .collect();

    let mut dispatched = 0;
    let mut no_work = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            DispatchOutcome::Dispatched { id: claimed, .. } => {
                assert_eq!(claimed, id);
                dispatched += 1;
            }
            DispatchOutcome::NoWork => no_work += 1,
        }
    }

    assert_eq!(dispatched, 1);
    assert_eq!(no_work, 7);
    assert_eq!(test_deps.delivery.attempts(), 1);
    assert_eq!(test_deps.delivery.max_in_flight(), 1);
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Processing));
}

#[tokio::test]
async fn concurrent_triggers_never_deliver_two_submissions_at_once() {
    let (test_deps, deps) = in_memory_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Delay(Duration::from_millis(50)));
    for n in 0..4 {
        submit(&deps, "alice", &format!("print({})", n)).await;
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let deps = Arc::clone(&deps);
            tokio::spawn(async move { dispatch_next(&deps).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(test_deps.delivery.max_in_flight(), 1);
    let names: std::collections::HashSet<String> = test_deps
        .delivery
        .uploads()
        .into_iter()
        .map(|upload| upload.name)
        .collect();
    assert_eq!(names.len(), test_deps.delivery.uploads().len());
}

#[tokio::test]
async fn failed_delivery_leaves_submission_pending() {
    let (test_deps, deps) = in_memory_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Fail("550 Permission denied".to_string()));
    let id = submit(&deps, "alice", "print(1)").await;
    let before = test_deps.store.get(id).unwrap();

    let err = dispatch_next(&deps).await.unwrap_err();

    match &err {
        SubmissionError::DeliveryFailed { id: failed, reason } => {
            assert_eq!(*failed, id);
            assert!(reason.contains("550"));
        }
        other => panic!("expected DeliveryFailed, got {other:?}"),
    }
    assert!(err.is_retryable());
    let after = test_deps.store.get(id).unwrap();
    assert_eq!(after.status, SubmissionStatus::Submitted);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(!test_deps.store.is_claimed(id));
}

#[tokio::test]
async fn failed_delivery_is_retried_by_the_next_trigger() {
    let (test_deps, deps) = in_memory_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Fail("connection reset".to_string()));
    let id = submit(&deps, "alice", "print(1)").await;
    assert!(dispatch_next(&deps).await.is_err());

    test_deps.delivery.set_behavior(DeliveryBehavior::Succeed);
    let outcome = dispatch_next(&deps).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Dispatched { id: claimed, .. } if claimed == id));
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Processing));
    assert_eq!(test_deps.delivery.attempts(), 2);
}

#[tokio::test]
async fn timed_out_delivery_counts_as_failure() {
    let test_deps = TestDependencies::new().with_settings(LifecycleSettings {
        delivery_timeout: Duration::from_millis(50),
        ..LifecycleSettings::default()
    });
    let deps = test_deps.server_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Delay(Duration::from_secs(5)));
    let id = submit(&deps, "alice", "print(1)").await;

    let err = dispatch_next(&deps).await.unwrap_err();

    assert!(matches!(err, SubmissionError::DeliveryFailed { .. }));
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Submitted));
    assert!(!test_deps.store.is_claimed(id));
    assert!(test_deps.delivery.uploads().is_empty());
}

#[tokio::test]
async fn timed_out_delivery_is_no_longer_in_flight() {
    let test_deps = TestDependencies::new().with_settings(LifecycleSettings {
        delivery_timeout: Duration::from_millis(50),
        ..LifecycleSettings::default()
    });
    let deps = test_deps.server_deps();
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Delay(Duration::from_secs(5)));
    submit(&deps, "alice", "print(1)").await;

    assert!(dispatch_next(&deps).await.is_err());

    assert_eq!(test_deps.delivery.attempts(), 1);
    assert_eq!(test_deps.delivery.in_flight(), 0);
}

#[tokio::test]
async fn short_lease_does_not_expire_during_a_slow_delivery() {
    let test_deps = TestDependencies::new().with_settings(LifecycleSettings {
        delivery_timeout: Duration::from_secs(2),
        claim_lease: Duration::from_millis(50),
        ..LifecycleSettings::default()
    });
    let deps = Arc::new(test_deps.server_deps());
    test_deps
        .delivery
        .set_behavior(DeliveryBehavior::Delay(Duration::from_millis(300)));
    let id = submit(&deps, "alice", "print(1)").await;

    let first = {
        let deps = Arc::clone(&deps);
        tokio::spawn(async move { dispatch_next(&deps).await })
    };
    // Well past the configured lease, while the first upload is still running
    tokio::time::sleep(Duration::from_millis(120)).await;
    let second = dispatch_next(&deps).await.unwrap();

    assert_eq!(second, DispatchOutcome::NoWork);
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, DispatchOutcome::Dispatched { id: claimed, .. } if claimed == id));
    assert_eq!(test_deps.delivery.attempts(), 1);
    assert_eq!(test_deps.delivery.max_in_flight(), 1);
    assert_eq!(test_deps.delivery.uploads().len(), 1);
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Processing));
}

#[tokio::test]
async fn dispatch_restages_a_missing_artifact_from_the_store() {
    let (test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print('from row')").await;
    test_deps.staging.remove(id);

    dispatch_next(&deps).await.unwrap();

    let uploads = test_deps.delivery.uploads();
    assert_eq!(uploads[0].body, b"print('from row')".to_vec());
    assert_eq!(test_deps.staging.get(id).as_deref(), Some("print('from row')"));
}

#[tokio::test]
async fn dispatch_reports_store_unavailable_without_delivering() {
    let (test_deps, deps) = in_memory_deps();
    submit(&deps, "alice", "print(1)").await;
    test_deps.store.set_unavailable(true);

    let err = dispatch_next(&deps).await.unwrap_err();

    assert!(matches!(err, SubmissionError::StoreUnavailable(_)));
    assert_eq!(test_deps.delivery.attempts(), 0);
}

#[tokio::test]
async fn expired_claims_are_recovered() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let id = submit(&deps, "alice", "print(1)").await;

    // A dispatcher that claimed and then vanished
    let stale = test_deps
        .store
        .conditional_claim(id, Duration::ZERO)
        .await
        .unwrap()
        .expect("claim should succeed");
    assert_eq!(stale.submission_id, id);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let outcome = dispatch_next(&deps).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Dispatched { id: claimed, .. } if claimed == id));
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Processing));
}

#[tokio::test]
async fn delivered_content_matches_intake_content() {
    let (test_deps, deps) = in_memory_deps();
    let code = "def main():\n    print('héllo')\n\nmain()\n";
    let id = submit(&deps, "alice", code).await;

    dispatch_next(&deps).await.unwrap();

    let uploads = test_deps.delivery.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, format!("{}.py", id));
    assert_eq!(uploads[0].body, code.as_bytes());
    assert_eq!(test_deps.staging.get(id).as_deref(), Some(code));
}

// =============================================================================
// Status updates
// =============================================================================

#[tokio::test]
async fn status_update_follows_the_lifecycle() {
    let (test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print(1)").await;
    dispatch_next(&deps).await.unwrap();
    let processing_at = test_deps.store.get(id).unwrap().updated_at;

    update_submission_status(id, SubmissionStatus::Completed, &deps)
        .await
        .unwrap();

    let row = test_deps.store.get(id).unwrap();
    assert_eq!(row.status, SubmissionStatus::Completed);
    assert!(row.updated_at >= processing_at);
    assert!(row.updated_at >= row.created_at);
}

#[tokio::test]
async fn status_update_rejects_illegal_transitions() {
    let (test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print(1)").await;

    // SUBMITTED cannot jump to COMPLETED
    let err = update_submission_status(id, SubmissionStatus::Completed, &deps)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::IllegalTransition {
            from: SubmissionStatus::Submitted,
            to: SubmissionStatus::Completed
        }
    ));

    update_submission_status(id, SubmissionStatus::Failed, &deps)
        .await
        .unwrap();

    // Terminal states never move again
    for next in SubmissionStatus::ALL {
        let err = update_submission_status(id, next, &deps).await.unwrap_err();
        assert!(matches!(err, SubmissionError::IllegalTransition { .. }));
    }
    assert_eq!(test_deps.store.status_of(id), Some(SubmissionStatus::Failed));
}

#[tokio::test]
async fn status_update_of_unknown_submission_is_not_found() {
    let (_test_deps, deps) = in_memory_deps();

    let err = update_submission_status(SubmissionId::new(99), SubmissionStatus::Failed, &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, SubmissionError::NotFound(id) if id == SubmissionId::new(99)));
}

#[tokio::test]
async fn failing_a_pending_submission_takes_it_out_of_dispatch() {
    let (test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print(1)").await;

    update_submission_status(id, SubmissionStatus::Failed, &deps)
        .await
        .unwrap();

    assert_eq!(dispatch_next(&deps).await.unwrap(), DispatchOutcome::NoWork);
    assert_eq!(test_deps.delivery.attempts(), 0);
}

// =============================================================================
// Status queries
// =============================================================================

#[tokio::test]
async fn status_query_checks_credentials() {
    let (_test_deps, deps) = in_memory_deps();
    let id = submit(&deps, "alice", "print(1)").await;

    let status = fetch_submission_status("alice", id, TEST_SECRET, &deps)
        .await
        .unwrap();
    assert_eq!(status, SubmissionStatus::Submitted);

    let err = fetch_submission_status("alice", id, "wrong-secret", &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Unauthorized));

    let err = fetch_submission_status("mallory", id, TEST_SECRET, &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::NotFound(_)));

    let err = fetch_submission_status("alice", SubmissionId::new(id.as_i64() + 1), TEST_SECRET, &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::NotFound(_)));
}

#[tokio::test]
async fn alice_submission_end_to_end() {
    let (test_deps, deps) = in_memory_deps();

    let id = submit(&deps, "alice", "print(1)").await;
    assert_eq!(id, SubmissionId::new(1));

    let outcome = dispatch_next(&deps).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Dispatched { id: claimed, .. } if claimed == id));

    let uploads = test_deps.delivery.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, "1.py");
    assert_eq!(uploads[0].body, b"print(1)".to_vec());

    let status = fetch_submission_status("alice", id, TEST_SECRET, &deps)
        .await
        .unwrap();
    assert_eq!(status, SubmissionStatus::Processing);
}
