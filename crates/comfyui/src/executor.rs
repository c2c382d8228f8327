//! Submit a transformed job, follow it to completion, download its image.
//!
//! Each execution opens its own push channel *before* submitting, so no
//! event for the new prompt can be missed, and tears the channel down on
//! every terminal path.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use poser_core::error::CoreError;
use poser_core::params::ParameterSet;
use poser_core::process::ProcessKind;
use poser_core::slot_mapping::completion_sentinel_node;
use poser_core::template::JobTemplate;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection, WsStream};
use crate::output::{find_artifact, OutputLedger};
use crate::session::{await_completion, ProgressFn, SessionError, SessionState};

/// Grace period for the WebSocket close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything known about a submitted prompt.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub prompt_id: String,
    pub client_id: String,
    pub kind: ProcessKind,
    pub params: ParameterSet,
    pub workflow: JobTemplate,
}

/// The downloaded result image.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub subfolder: String,
    pub bytes: Vec<u8>,
    /// Merged per-node outputs the artifact was picked from.
    pub outputs: OutputLedger,
}

impl Artifact {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error(transparent)]
    Connection(#[from] ComfyUIClientError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no artifact in output")]
    NoArtifact,
}

impl From<ExecutionError> for CoreError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Configuration(msg) => CoreError::Configuration(msg),
            ExecutionError::Api(e) => CoreError::Transport(e.to_string()),
            ExecutionError::Connection(e) => CoreError::Transport(e.to_string()),
            ExecutionError::Session(e) => e.into(),
            err @ ExecutionError::NoArtifact => CoreError::NotFound(err.to_string()),
        }
    }
}

/// Drives executions against one ComfyUI instance.
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    api: ComfyUIApi,
    client: ComfyUIClient,
}

impl WorkflowExecutor {
    pub fn new(api_url: String, ws_url: String) -> Self {
        Self {
            api: ComfyUIApi::new(api_url),
            client: ComfyUIClient::new(ws_url),
        }
    }

    /// Upload an input image; returns the name a loader node must reference.
    pub async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<String, ExecutionError> {
        let name = self.api.upload_image(bytes, filename).await?;
        tracing::info!(name = %name, "Uploaded source image");
        Ok(name)
    }

    /// Open the push channel for `client_id` and queue `workflow`.
    ///
    /// The returned connection must be handed to [`Self::await_artifact`].
    pub async fn submit(
        &self,
        client_id: &str,
        params: ParameterSet,
        workflow: JobTemplate,
    ) -> Result<(ExecutionHandle, ComfyUIConnection), ExecutionError> {
        let kind = params.kind();
        let mut connection = self.client.connect(client_id).await?;

        let submitted = match self.api.submit_workflow(&workflow.to_value(), client_id).await {
            Ok(submitted) => submitted,
            Err(e) => {
                close_channel(&mut connection.ws_stream, client_id).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            prompt_id = %submitted.prompt_id,
            client_id = %client_id,
            kind = %kind,
            queue_number = submitted.number,
            state = %SessionState::Submitted,
            "Workflow submitted",
        );

        let handle = ExecutionHandle {
            prompt_id: submitted.prompt_id,
            client_id: client_id.to_string(),
            kind,
            params,
            workflow,
        };
        Ok((handle, connection))
    }

    /// Wait for `handle` to finish, then download its artifact.
    ///
    /// The push channel is closed before this returns, whatever the outcome.
    pub async fn await_artifact(
        &self,
        handle: &ExecutionHandle,
        connection: ComfyUIConnection,
        timeout: Duration,
        on_progress: Option<&ProgressFn>,
    ) -> Result<Artifact, ExecutionError> {
        let ComfyUIConnection { mut ws_stream, .. } = connection;
        let sentinel = completion_sentinel_node(handle.kind);

        let outcome = await_completion(
            &mut ws_stream,
            &self.api,
            &handle.prompt_id,
            sentinel,
            timeout,
            on_progress,
        )
        .await;
        close_channel(&mut ws_stream, &handle.client_id).await;

        let outputs = outcome?;
        let image = find_artifact(&outputs).ok_or(ExecutionError::NoArtifact)?;
        let bytes = self.api.view_image(&image).await?;

        tracing::info!(
            prompt_id = %handle.prompt_id,
            filename = %image.filename,
            subfolder = %image.subfolder,
            size = bytes.len(),
            state = %SessionState::Succeeded,
            "Downloaded artifact",
        );

        Ok(Artifact {
            filename: image.filename,
            subfolder: image.subfolder,
            bytes,
            outputs,
        })
    }

    /// Submit and await in one call.
    pub async fn run(
        &self,
        client_id: &str,
        params: ParameterSet,
        workflow: JobTemplate,
        timeout: Duration,
        on_progress: Option<&ProgressFn>,
    ) -> Result<(ExecutionHandle, Artifact), ExecutionError> {
        if workflow.is_empty() {
            return Err(ExecutionError::Configuration(format!(
                "empty workflow for {}",
                params.kind()
            )));
        }
        let (handle, connection) = self.submit(client_id, params, workflow).await?;
        let artifact = self
            .await_artifact(&handle, connection, timeout, on_progress)
            .await?;
        Ok((handle, artifact))
    }
}

async fn close_channel(ws_stream: &mut WsStream, client_id: &str) {
    match tokio::time::timeout(CLOSE_TIMEOUT, ws_stream.close(None)).await {
        Ok(Ok(())) => tracing::debug!(client_id = %client_id, "Closed ComfyUI push channel"),
        Ok(Err(e)) => tracing::debug!(client_id = %client_id, error = %e, "Push channel close failed"),
        Err(_) => tracing::debug!(client_id = %client_id, "Push channel close timed out"),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn execution_errors_map_to_core_taxonomy() {
        assert_matches!(CoreError::from(ExecutionError::NoArtifact), CoreError::NotFound(ref m) if m == "no artifact in output");
        assert_matches!(
            CoreError::from(ExecutionError::Api(ComfyUIApiError::ApiError { status: 503, body: String::new() })),
            CoreError::Transport(_)
        );
        assert_matches!(
            CoreError::from(ExecutionError::Connection(ComfyUIClientError::Connection("refused".into()))),
            CoreError::Transport(_)
        );
        assert_matches!(
            CoreError::from(ExecutionError::Session(SessionError::Engine("bad".into()))),
            CoreError::EngineExecution(ref m) if m == "bad"
        );
    }

    #[test]
    fn artifact_encodes_standard_base64() {
        let artifact = Artifact {
            filename: "x.png".into(),
            subfolder: "out".into(),
            bytes: b"hello".to_vec(),
            outputs: OutputLedger::new(),
        };
        assert_eq!(artifact.to_base64(), "aGVsbG8=");
    }
}
