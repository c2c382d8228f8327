//! Run log seam between the runner and persistence.
//!
//! The runner only needs two operations: append a finished run and look up
//! the latest cached image for a fingerprint. Production uses PostgreSQL;
//! without `DATABASE_URL` the log is disabled and every lookup misses.

use async_trait::async_trait;
use poser_db::models::workflow_run::NewWorkflowRun;
use poser_db::repositories::WorkflowRunRepo;
use poser_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Run log unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RunLog: Send + Sync {
    /// Append one run.
    async fn record(&self, run: NewWorkflowRun) -> Result<(), RunLogError>;

    /// Encoded image of the most recent successful run for `fingerprint`.
    async fn cached_image(&self, fingerprint: &str) -> Result<Option<String>, RunLogError>;

    /// Whether the backing store answers.
    async fn is_healthy(&self) -> bool;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// PostgreSQL-backed run log.
pub struct PgRunLog {
    pool: DbPool,
}

impl PgRunLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLog for PgRunLog {
    async fn record(&self, run: NewWorkflowRun) -> Result<(), RunLogError> {
        let stored = WorkflowRunRepo::insert(&self.pool, &run).await?;
        tracing::debug!(run_id = stored.id, status = %stored.status, "Run logged");
        Ok(())
    }

    async fn cached_image(&self, fingerprint: &str) -> Result<Option<String>, RunLogError> {
        Ok(WorkflowRunRepo::find_cached_image(&self.pool, fingerprint).await?)
    }

    async fn is_healthy(&self) -> bool {
        poser_db::health_check(&self.pool).await.is_ok()
    }
}

/// Run log used when no database is configured.
pub struct DisabledRunLog;

#[async_trait]
impl RunLog for DisabledRunLog {
    async fn record(&self, _run: NewWorkflowRun) -> Result<(), RunLogError> {
        Ok(())
    }

    async fn cached_image(&self, _fingerprint: &str) -> Result<Option<String>, RunLogError> {
        Ok(None)
    }

    async fn is_healthy(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
