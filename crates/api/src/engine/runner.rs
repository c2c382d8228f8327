//! End-to-end generation for one request.
//!
//! ```text
//! validate → fingerprint → cache lookup ─hit─→ cached image
//!                               │miss
//!                               ▼
//!      upload source → load template → transform → submit → await → download
//!                               │
//!                               ▼
//!                        append run log
//! ```
//!
//! Run log failures only ever produce a warning.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use poser_comfyui::executor::{Artifact, WorkflowExecutor};
use poser_comfyui::messages::ProgressData;
use poser_core::error::CoreError;
use poser_core::hashing::{fingerprint, sha256_hex};
use poser_core::params::{validate, ParameterSet};
use poser_core::process::ProcessKind;
use poser_core::template_store::TemplateStore;
use poser_core::transform::transform;
use poser_db::models::workflow_run::{NewWorkflowRun, RUN_STATUS_ERROR, RUN_STATUS_SUCCESS};
use serde_json::{json, Value};

use super::run_log::RunLog;

/// A request as handed over by the routing layer.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: ProcessKind,
    /// Loosely-typed parameters, validated by the runner.
    pub params: Value,
    pub timeout: Duration,
    /// Raw source portrait, portrait-to-pose only.
    pub source_image: Option<Vec<u8>>,
}

/// What the routing layer returns to the caller.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub kind: ProcessKind,
    pub cached: bool,
    /// Engine prompt id; `None` for cache hits.
    pub prompt_id: Option<String>,
    pub fingerprint: String,
    pub image_base64: String,
}

impl GenerationOutcome {
    /// Decoded image bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, CoreError> {
        STANDARD
            .decode(&self.image_base64)
            .map_err(|e| CoreError::Internal(format!("Stored image is not valid base64: {e}")))
    }
}

/// Progress of an attempt, kept for the run log on every exit path.
#[derive(Debug, Default)]
struct Attempt {
    prompt_id: Option<String>,
    workflow: Option<Value>,
}

pub struct GenerationRunner {
    executor: WorkflowExecutor,
    templates: TemplateStore,
    run_log: Arc<dyn RunLog>,
}

impl GenerationRunner {
    pub fn new(executor: WorkflowExecutor, templates: TemplateStore, run_log: Arc<dyn RunLog>) -> Self {
        Self {
            executor,
            templates,
            run_log,
        }
    }

    pub fn run_log(&self) -> &dyn RunLog {
        self.run_log.as_ref()
    }

    /// Produce the image for `request`, from cache when possible.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationOutcome, CoreError> {
        let GenerationRequest {
            kind,
            params: mut raw,
            timeout,
            source_image,
        } = request;

        // The source portrait is identified by content so identical uploads
        // share a fingerprint.
        let upload = match source_image {
            Some(bytes) if kind == ProcessKind::PortraitToPose => {
                let name = format!("{}.png", sha256_hex(&bytes));
                if raw.is_null() {
                    raw = json!({});
                }
                if let Value::Object(map) = &mut raw {
                    map.insert("source_image".to_string(), Value::String(name.clone()));
                }
                Some((bytes, name))
            }
            Some(_) => {
                return Err(CoreError::Validation(format!(
                    "source image is only accepted for {}",
                    ProcessKind::PortraitToPose
                )))
            }
            None => None,
        };

        let params = validate(kind, &raw)?;
        let params_value = params.to_value();
        let fingerprint = fingerprint(kind, &params_value);

        match self.run_log.cached_image(&fingerprint).await {
            Ok(Some(image_base64)) => {
                tracing::info!(kind = %kind, fingerprint = %fingerprint, "Serving cached image");
                return Ok(GenerationOutcome {
                    kind,
                    cached: true,
                    prompt_id: None,
                    fingerprint,
                    image_base64,
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, fingerprint = %fingerprint, "Cache lookup failed");
            }
        }

        let client_id = uuid::Uuid::new_v4().to_string();
        let mut attempt = Attempt::default();
        let result = self
            .execute(&client_id, params, upload, timeout, &mut attempt)
            .await;

        let record = NewWorkflowRun {
            client_id: client_id.clone(),
            prompt_id: attempt.prompt_id.clone(),
            process_type: kind.as_str().to_string(),
            params: params_value,
            processed_workflow: attempt.workflow.take().unwrap_or(Value::Null),
            status: String::new(),
            error_message: None,
            response_meta: None,
            request_hash: Some(fingerprint.clone()),
            response_image_base64: None,
        };

        match result {
            Ok(artifact) => {
                let image_base64 = artifact.to_base64();
                self.record(NewWorkflowRun {
                    status: RUN_STATUS_SUCCESS.to_string(),
                    response_meta: Some(json!({
                        "filename": artifact.filename,
                        "subfolder": artifact.subfolder,
                        "outputs": artifact.outputs.to_value(),
                    })),
                    response_image_base64: Some(image_base64.clone()),
                    ..record
                })
                .await;

                Ok(GenerationOutcome {
                    kind,
                    cached: false,
                    prompt_id: attempt.prompt_id,
                    fingerprint,
                    image_base64,
                })
            }
            Err(e) => {
                tracing::error!(
                    client_id = %client_id,
                    kind = %kind,
                    prompt_id = ?attempt.prompt_id,
                    error = %e,
                    "Generation failed",
                );
                self.record(NewWorkflowRun {
                    status: RUN_STATUS_ERROR.to_string(),
                    error_message: Some(e.to_string()),
                    ..record
                })
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        client_id: &str,
        mut params: ParameterSet,
        upload: Option<(Vec<u8>, String)>,
        timeout: Duration,
        attempt: &mut Attempt,
    ) -> Result<Artifact, CoreError> {
        let kind = params.kind();

        if let Some((bytes, name)) = upload {
            let stored = self.executor.upload_image(bytes, &name).await?;
            if let ParameterSet::PortraitToPose(p) = &mut params {
                p.source_image = stored;
            }
        }

        let template = self.templates.load(kind).await?;
        let workflow = transform(&template, &params)?;
        attempt.workflow = Some(workflow.to_value());

        let (handle, connection) = self.executor.submit(client_id, params, workflow).await?;
        attempt.prompt_id = Some(handle.prompt_id.clone());

        let log_client = client_id.to_string();
        let on_progress = move |progress: &ProgressData| {
            tracing::debug!(
                client_id = %log_client,
                value = progress.value,
                max = progress.max,
                percent = progress.percent(),
                "Generation progress",
            );
        };

        let artifact = self
            .executor
            .await_artifact(&handle, connection, timeout, Some(&on_progress))
            .await?;
        Ok(artifact)
    }

    async fn record(&self, run: NewWorkflowRun) {
        if !self.run_log.is_enabled() {
            return;
        }
        let status = run.status.clone();
        if let Err(e) = self.run_log.record(run).await {
            tracing::warn!(error = %e, status = %status, "Failed to write run log");
        }
    }
}
