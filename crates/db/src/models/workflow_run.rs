//! Workflow run log models.
//!
//! Rows are immutable once written (no `updated_at`).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use poser_core::types::{DbId, Timestamp};

/// `status` value of a run that produced an artifact.
pub const RUN_STATUS_SUCCESS: &str = "success";
/// `status` value of a run that failed at any stage.
pub const RUN_STATUS_ERROR: &str = "error";

/// A single row of `workflow_runs`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowRun {
    pub id: DbId,
    pub client_id: String,
    pub prompt_id: Option<String>,
    pub process_type: String,
    pub params: serde_json::Value,
    pub processed_workflow: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
    pub response_meta: Option<serde_json::Value>,
    pub request_hash: Option<String>,
    pub response_image_base64: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending a run.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflowRun {
    pub client_id: String,
    pub prompt_id: Option<String>,
    pub process_type: String,
    pub params: serde_json::Value,
    pub processed_workflow: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
    pub response_meta: Option<serde_json::Value>,
    pub request_hash: Option<String>,
    pub response_image_base64: Option<String>,
}
