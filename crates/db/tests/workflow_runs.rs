//! Run log repository tests. Need a PostgreSQL `DATABASE_URL`; run with
//! `--ignored`.

use poser_db::models::workflow_run::{NewWorkflowRun, RUN_STATUS_ERROR, RUN_STATUS_SUCCESS};
use poser_db::repositories::WorkflowRunRepo;
use serde_json::json;
use sqlx::PgPool;

fn run(status: &str, hash: Option<&str>, image: Option<&str>) -> NewWorkflowRun {
    NewWorkflowRun {
        client_id: "client-1".to_string(),
        prompt_id: Some("prompt-1".to_string()),
        process_type: "portrait".to_string(),
        params: json!({"width": 896}),
        processed_workflow: json!({"159": {"class_type": "PrimitiveInt", "inputs": {"value": 896}}}),
        status: status.to_string(),
        error_message: None,
        response_meta: None,
        request_hash: hash.map(str::to_string),
        response_image_base64: image.map(str::to_string),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn insert_returns_stored_row(pool: PgPool) {
    let stored = WorkflowRunRepo::insert(&pool, &run(RUN_STATUS_SUCCESS, Some("h"), Some("aGk=")))
        .await
        .unwrap();

    assert!(stored.id > 0);
    assert_eq!(stored.status, RUN_STATUS_SUCCESS);
    assert_eq!(stored.params, json!({"width": 896}));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cache_lookup_returns_latest_success_with_image(pool: PgPool) {
    WorkflowRunRepo::insert(&pool, &run(RUN_STATUS_SUCCESS, Some("h"), Some("b2xk"))).await.unwrap();
    WorkflowRunRepo::insert(&pool, &run(RUN_STATUS_SUCCESS, Some("h"), Some("bmV3"))).await.unwrap();
    WorkflowRunRepo::insert(&pool, &run(RUN_STATUS_ERROR, Some("h"), None)).await.unwrap();
    WorkflowRunRepo::insert(&pool, &run(RUN_STATUS_SUCCESS, Some("h"), Some(""))).await.unwrap();

    let hit = WorkflowRunRepo::find_cached_image(&pool, "h").await.unwrap();
    assert_eq!(hit.as_deref(), Some("bmV3"));

    let miss = WorkflowRunRepo::find_cached_image(&pool, "other").await.unwrap();
    assert!(miss.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn status_outside_enumeration_is_rejected(pool: PgPool) {
    let result = WorkflowRunRepo::insert(&pool, &run("pending", None, None)).await;
    assert!(result.is_err());
}
