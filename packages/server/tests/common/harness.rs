//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared across all tests. Migrations run once
//! into a template database; every test then gets its own database cloned
//! from that template, so the system-wide dispatch claim and the "oldest
//! pending" order never leak between tests running in parallel.

use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection, PgPool};
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

const TEMPLATE_DB: &str = "submissions_template";

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    /// Base URL without a database name
    server_url: String,
    /// Cloning a template is serialized; Postgres rejects concurrent copies
    clone_lock: Mutex<()>,
    // Keep container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    /// Start the container and migrate the template database.
    async fn init() -> Result<Self> {
        // Initialize tracing subscriber to respect RUST_LOG environment variable.
        // Uses try_init() to avoid panicking if already initialized.
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let server_url = format!("postgresql://postgres:postgres@{}:{}", pg_host, pg_port);

        let mut admin = PgConnection::connect(&format!("{}/postgres", server_url))
            .await
            .context("Failed to connect to Postgres")?;
        sqlx::query(&format!("CREATE DATABASE {}", TEMPLATE_DB))
            .execute(&mut admin)
            .await
            .context("Failed to create template database")?;
        admin.close().await?;

        // Run migrations once on the template; it must have no open
        // connections when it is cloned
        let template_pool = PgPool::connect(&format!("{}/{}", server_url, TEMPLATE_DB))
            .await
            .context("Failed to connect to template database")?;
        sqlx::migrate!("./migrations")
            .run(&template_pool)
            .await
            .context("Failed to run migrations")?;
        template_pool.close().await;

        Ok(Self {
            server_url,
            clone_lock: Mutex::new(()),
            _postgres: postgres,
        })
    }

    /// Get or initialize the shared infrastructure.
    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness that manages test infrastructure.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let store = ctx.store();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Pool on this test's private, migrated database.
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
            .await
            .expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    /// Creates a fresh database from the migrated template.
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        // Connections are opened per test: each #[tokio::test] has its own runtime
        let db_name = format!("test_{}", Uuid::new_v4().simple());
        {
            let _guard = infra.clone_lock.lock().await;
            let mut admin = PgConnection::connect(&format!("{}/postgres", infra.server_url))
                .await
                .context("Failed to connect to Postgres")?;
            sqlx::query(&format!(
                "CREATE DATABASE {} TEMPLATE {}",
                db_name, TEMPLATE_DB
            ))
            .execute(&mut admin)
            .await
            .context("Failed to create test database")?;
            admin.close().await?;
        }

        let db_pool = PgPool::connect(&format!("{}/{}", infra.server_url, db_name))
            .await
            .context("Failed to connect to test database")?;

        Ok(Self { db_pool })
    }

    pub fn store(&self) -> submission_core::domains::submissions::models::PostgresSubmissionStore {
        submission_core::domains::submissions::models::PostgresSubmissionStore::new(
            self.db_pool.clone(),
        )
    }
}
