//! Handlers for the generation endpoints.
//!
//! Routes:
//! - `POST /api/v1/portrait`               — portrait (detail variant with `detail: true`)
//! - `POST /api/v1/pose`                   — pose (detail variant with `detail: true`)
//! - `POST /api/v1/portrait-to-pose`       — pose driven by an uploaded portrait
//! - `POST /api/v1/{...}/image`            — same, answering with raw image bytes

use std::time::Duration;

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use poser_core::error::CoreError;
use poser_core::process::ProcessKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::runner::{GenerationOutcome, GenerationRequest};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body shared by all generation endpoints.
#[derive(Debug, Deserialize)]
pub struct GenerationBody {
    #[serde(default)]
    pub params: Value,
    /// Completion wait in seconds.
    pub timeout: Option<u64>,
    /// Run the detailer variant of the template.
    #[serde(default)]
    pub detail: bool,
    /// Base64 source portrait (plain or `data:` URL), portrait-to-pose only.
    pub source_image_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub status: &'static str,
    pub cached: bool,
    pub prompt_id: Option<String>,
    pub fingerprint: String,
    pub image_base64: String,
}

impl From<GenerationOutcome> for GenerationResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            status: "success",
            cached: outcome.cached,
            prompt_id: outcome.prompt_id,
            fingerprint: outcome.fingerprint,
            image_base64: outcome.image_base64,
        }
    }
}

/// The three request families exposed over HTTP.
#[derive(Debug, Clone, Copy)]
enum Family {
    Portrait,
    Pose,
    PortraitToPose,
}

impl Family {
    fn kind(self, detail: bool) -> ProcessKind {
        match (self, detail) {
            (Family::Portrait, false) => ProcessKind::Portrait,
            (Family::Portrait, true) => ProcessKind::PortraitDetail,
            (Family::Pose, false) => ProcessKind::Pose,
            (Family::Pose, true) => ProcessKind::PoseDetail,
            (Family::PortraitToPose, _) => ProcessKind::PortraitToPose,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON endpoints
// ---------------------------------------------------------------------------

/// POST /api/v1/portrait
pub async fn portrait(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<impl IntoResponse> {
    generate_json(&state, Family::Portrait, body).await
}

/// POST /api/v1/pose
pub async fn pose(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<impl IntoResponse> {
    generate_json(&state, Family::Pose, body).await
}

/// POST /api/v1/portrait-to-pose
pub async fn portrait_to_pose(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<impl IntoResponse> {
    generate_json(&state, Family::PortraitToPose, body).await
}

// ---------------------------------------------------------------------------
// Raw image endpoints
// ---------------------------------------------------------------------------

/// POST /api/v1/portrait/image
pub async fn portrait_image(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<Response> {
    generate_image(&state, Family::Portrait, body).await
}

/// POST /api/v1/pose/image
pub async fn pose_image(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<Response> {
    generate_image(&state, Family::Pose, body).await
}

/// POST /api/v1/portrait-to-pose/image
pub async fn portrait_to_pose_image(
    State(state): State<AppState>,
    Json(body): Json<GenerationBody>,
) -> AppResult<Response> {
    generate_image(&state, Family::PortraitToPose, body).await
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn generate_json(
    state: &AppState,
    family: Family,
    body: GenerationBody,
) -> AppResult<Json<DataResponse<GenerationResponse>>> {
    let outcome = run(state, family, body).await?;
    Ok(Json(DataResponse {
        data: outcome.into(),
    }))
}

async fn generate_image(state: &AppState, family: Family, body: GenerationBody) -> AppResult<Response> {
    let outcome = run(state, family, body).await?;
    let kind = outcome.kind;
    let bytes = outcome.image_bytes()?;
    let (content_type, extension) = sniff_image(&bytes);

    Ok((
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("inline; filename={kind}.{extension}"),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn run(state: &AppState, family: Family, body: GenerationBody) -> AppResult<GenerationOutcome> {
    let request = build_request(state, family, body)?;
    Ok(state.runner.run(request).await?)
}

fn build_request(state: &AppState, family: Family, body: GenerationBody) -> AppResult<GenerationRequest> {
    let kind = family.kind(body.detail);
    let timeout = resolve_timeout(
        body.timeout,
        state.config.default_timeout_secs,
        state.config.max_timeout_secs,
    )?;

    let source_image = match body.source_image_base64 {
        Some(encoded) => {
            if kind != ProcessKind::PortraitToPose {
                return Err(AppError::Core(CoreError::Validation(
                    "source_image_base64 is only accepted by portrait-to-pose".to_string(),
                )));
            }
            Some(decode_image(&encoded)?)
        }
        None => None,
    };

    Ok(GenerationRequest {
        kind,
        params: body.params,
        timeout,
        source_image,
    })
}

/// Requested wait, or the default; rejected outside `1..=max`.
fn resolve_timeout(requested: Option<u64>, default: u64, max: u64) -> AppResult<Duration> {
    let secs = requested.unwrap_or(default);
    if !(1..=max).contains(&secs) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "timeout: must be between 1 and {max} (got {secs})"
        ))));
    }
    Ok(Duration::from_secs(secs))
}

fn decode_image(encoded: &str) -> AppResult<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(format!("source_image_base64 is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("source_image_base64 is empty".to_string()));
    }
    Ok(bytes)
}

/// Content type and file extension from the image's magic bytes.
fn sniff_image(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => ("image/png", "png"),
        Ok(ImageFormat::Jpeg) => ("image/jpeg", "jpg"),
        Ok(ImageFormat::WebP) => ("image/webp", "webp"),
        _ => ("application/octet-stream", "bin"),
    }
}
