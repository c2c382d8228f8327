//! Repository for the `workflow_runs` table.

use sqlx::PgPool;

use crate::models::workflow_run::{NewWorkflowRun, WorkflowRun, RUN_STATUS_SUCCESS};

/// Column list for `workflow_runs` SELECT queries.
const COLUMNS: &str = "\
    id, client_id, prompt_id, process_type, params, processed_workflow, \
    status, error_message, response_meta, request_hash, response_image_base64, \
    created_at";

/// Append-only access to the run log.
pub struct WorkflowRunRepo;

impl WorkflowRunRepo {
    /// Append a run, returning the stored row.
    pub async fn insert(pool: &PgPool, input: &NewWorkflowRun) -> Result<WorkflowRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_runs \
                (client_id, prompt_id, process_type, params, processed_workflow, \
                 status, error_message, response_meta, request_hash, response_image_base64) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(&input.client_id)
            .bind(&input.prompt_id)
            .bind(&input.process_type)
            .bind(&input.params)
            .bind(&input.processed_workflow)
            .bind(&input.status)
            .bind(&input.error_message)
            .bind(&input.response_meta)
            .bind(&input.request_hash)
            .bind(&input.response_image_base64)
            .fetch_one(pool)
            .await
    }

    /// Encoded image of the most recent successful run for `request_hash`.
    ///
    /// Rows without an image never count as a hit.
    pub async fn find_cached_image(
        pool: &PgPool,
        request_hash: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT response_image_base64 FROM workflow_runs \
             WHERE request_hash = $1 \
               AND status = $2 \
               AND response_image_base64 IS NOT NULL \
               AND response_image_base64 <> '' \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(request_hash)
        .bind(RUN_STATUS_SUCCESS)
        .fetch_optional(pool)
        .await
    }
}
