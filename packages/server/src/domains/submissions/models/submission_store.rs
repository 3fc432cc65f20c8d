//! PostgreSQL-backed submission store.
//!
//! Claim atomicity comes from the database, not from process-local locks:
//! - `conditional_claim` is a single `UPDATE ... WHERE status = 'SUBMITTED'
//!   AND claim_token IS NULL`, so two concurrent triggers cannot both win
//!   the same row.
//! - The partial unique index `submissions_single_active_claim` rejects a
//!   second claim on any other row while one is outstanding.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DispatchClaim, NewSubmission, Submission, SubmissionStatus};
use crate::common::SubmissionId;
use crate::kernel::BaseSubmissionStore;

const SUBMISSION_COLUMNS: &str =
    "id, username, secret_hash, secret_salt, status, created_at, updated_at";

/// Submission store over a shared connection pool.
///
/// Every method acquires a pooled connection for the duration of one
/// statement; the pool returns it on every exit path.
#[derive(Clone)]
pub struct PostgresSubmissionStore {
    pool: PgPool,
}

impl PostgresSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

#[async_trait]
impl BaseSubmissionStore for PostgresSubmissionStore {
    async fn insert(&self, new: NewSubmission) -> Result<Submission> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"
            INSERT INTO submissions
                (username, secret_hash, secret_salt, code, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {SUBMISSION_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.secret.hash)
        .bind(&new.secret.salt)
        .bind(&new.code)
        .bind(SubmissionStatus::Submitted.as_str())
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(submission)
    }

    async fn find_by_id(&self, id: SubmissionId) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(submission)
    }

    async fn find_by_username_and_id(
        &self,
        username: &str,
        id: SubmissionId,
    ) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE username = $1 AND id = $2"
        ))
        .bind(username)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(submission)
    }

    async fn find_oldest_pending(&self) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"
            SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE status = 'SUBMITTED'
              AND claim_token IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(submission)
    }

    async fn load_code(&self, id: SubmissionId) -> Result<Option<String>> {
        let code = sqlx::query_scalar::<_, String>("SELECT code FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(code)
    }

    async fn conditional_claim(
        &self,
        id: SubmissionId,
        lease: Duration,
    ) -> Result<Option<DispatchClaim>> {
        let token = Uuid::new_v4();
        let claimed = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE submissions
            SET claim_token = $2,
                claim_expires_at = NOW() + make_interval(secs => $3)
            WHERE id = $1
              AND status = 'SUBMITTED'
              AND claim_token IS NULL
            RETURNING claim_expires_at
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await;

        match claimed {
            Ok(Some(expires_at)) => Ok(Some(DispatchClaim {
                submission_id: id,
                token,
                expires_at,
            })),
            Ok(None) => Ok(None),
            // Another submission holds the single active claim
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(submission_id = %id, "claim rejected: another dispatch is in flight");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_claim(&self, claim: &DispatchClaim, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'PROCESSING',
                updated_at = GREATEST($3, updated_at),
                claim_token = NULL,
                claim_expires_at = NULL
            WHERE id = $1
              AND claim_token = $2
              AND status = 'SUBMITTED'
            "#,
        )
        .bind(claim.submission_id)
        .bind(claim.token)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, claim: &DispatchClaim) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE submissions
            SET claim_token = NULL,
                claim_expires_at = NULL
            WHERE id = $1 AND claim_token = $2
            "#,
        )
        .bind(claim.submission_id)
        .bind(claim.token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recover_expired_claims(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET claim_token = NULL,
                claim_expires_at = NULL
            WHERE claim_token IS NOT NULL
              AND claim_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "recovered expired dispatch claims");
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
        // Leaving SUBMITTED invalidates any in-flight dispatch claim
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = $3,
                updated_at = GREATEST($4, updated_at),
                claim_token = NULL,
                claim_expires_at = NULL
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
