//! Typed, validated parameter sets per process kind.
//!
//! Requests arrive as loosely-typed JSON. [`validate`] reads each known
//! field with its expected type, fills kind-specific defaults, and enforces
//! the closed ranges below. Out-of-range values are rejected, never clamped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::error::CoreError;
use crate::plugins::PluginConfig;
use crate::process::ProcessKind;

// ---------------------------------------------------------------------------
// Bounds and defaults
// ---------------------------------------------------------------------------

pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 2048;
pub const MIN_STEPS: u32 = 18;
pub const MAX_STEPS: u32 = 30;
pub const MIN_CFG: f64 = 1.5;
pub const MAX_CFG: f64 = 4.0;

pub const DEFAULT_WIDTH: u32 = 896;
pub const DEFAULT_HEIGHT: u32 = 1216;
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_SAMPLER: &str = "dpmpp_2m_sde";
pub const DEFAULT_SCHEDULER: &str = "karras";

/// Defaults that differ between portrait and pose processes.
struct KindDefaults {
    steps: u32,
    cfg: f64,
    prompt: &'static str,
}

const PORTRAIT_DEFAULTS: KindDefaults = KindDefaults {
    steps: 20,
    cfg: 2.0,
    prompt: "portrait of a person",
};

const POSE_DEFAULTS: KindDefaults = KindDefaults {
    steps: 25,
    cfg: 3.0,
    prompt: "Pose of a person",
};

// ---------------------------------------------------------------------------
// Parameter records
// ---------------------------------------------------------------------------

/// Fields shared by every process kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationParams {
    #[validate(range(min = MIN_DIMENSION, max = MAX_DIMENSION))]
    pub width: u32,
    #[validate(range(min = MIN_DIMENSION, max = MAX_DIMENSION))]
    pub height: u32,
    #[validate(range(min = MIN_STEPS, max = MAX_STEPS))]
    pub steps: u32,
    #[validate(range(min = MIN_CFG, max = MAX_CFG))]
    pub cfg: f64,
    pub seed: u64,
    #[validate(length(min = 1))]
    pub sampler: String,
    #[validate(length(min = 1))]
    pub scheduler: String,
    #[validate(length(min = 1))]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub plugins: Option<PluginConfig>,
}

/// Pose generation driven by an uploaded portrait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PortraitToPoseParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub base: GenerationParams,
    /// Engine-side file name of the uploaded source portrait.
    #[validate(length(min = 1))]
    pub source_image: String,
}

/// A validated parameter set, one variant per [`ProcessKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSet {
    Portrait(GenerationParams),
    PortraitDetail(GenerationParams),
    Pose(GenerationParams),
    PoseDetail(GenerationParams),
    PortraitToPose(PortraitToPoseParams),
}

impl ParameterSet {
    pub fn kind(&self) -> ProcessKind {
        match self {
            ParameterSet::Portrait(_) => ProcessKind::Portrait,
            ParameterSet::PortraitDetail(_) => ProcessKind::PortraitDetail,
            ParameterSet::Pose(_) => ProcessKind::Pose,
            ParameterSet::PoseDetail(_) => ProcessKind::PoseDetail,
            ParameterSet::PortraitToPose(_) => ProcessKind::PortraitToPose,
        }
    }

    /// The fields common to all kinds.
    pub fn base(&self) -> &GenerationParams {
        match self {
            ParameterSet::Portrait(p)
            | ParameterSet::PortraitDetail(p)
            | ParameterSet::Pose(p)
            | ParameterSet::PoseDetail(p) => p,
            ParameterSet::PortraitToPose(p) => &p.base,
        }
    }

    pub fn plugins(&self) -> Option<&PluginConfig> {
        self.base().plugins.as_ref()
    }

    /// Logical field name and value pairs that can be written into a
    /// template. Absent optional fields are omitted.
    pub fn slot_values(&self) -> Vec<(&'static str, Value)> {
        let p = self.base();
        let mut values = vec![
            ("width", Value::from(p.width)),
            ("height", Value::from(p.height)),
            ("steps", Value::from(p.steps)),
            ("cfg", Value::from(p.cfg)),
            ("seed", Value::from(p.seed)),
            ("sampler", Value::from(p.sampler.clone())),
            ("scheduler", Value::from(p.scheduler.clone())),
            ("prompt", Value::from(p.prompt.clone())),
        ];
        if let Some(negative) = &p.negative_prompt {
            values.push(("negative_prompt", Value::from(negative.clone())));
        }
        if let ParameterSet::PortraitToPose(p) = self {
            values.push(("source_image", Value::from(p.source_image.clone())));
        }
        values
    }

    /// JSON form of the record (no variant tag), used for fingerprints and
    /// the run log.
    pub fn to_value(&self) -> Value {
        let value = match self {
            ParameterSet::Portrait(p)
            | ParameterSet::PortraitDetail(p)
            | ParameterSet::Pose(p)
            | ParameterSet::PoseDetail(p) => serde_json::to_value(p),
            ParameterSet::PortraitToPose(p) => serde_json::to_value(p),
        };
        value.unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Build the typed parameter set for `kind` from loosely-typed input.
///
/// `null` is treated as an empty object, so every field takes its default.
/// Unknown fields are ignored. Type mismatches and range violations fail
/// with [`CoreError::Validation`] naming the field.
pub fn validate(kind: ProcessKind, raw: &Value) -> Result<ParameterSet, CoreError> {
    let empty = Map::new();
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(CoreError::Validation(
                "Parameters must be a JSON object".to_string(),
            ))
        }
    };

    let defaults = if kind.is_portrait() {
        &PORTRAIT_DEFAULTS
    } else {
        &POSE_DEFAULTS
    };

    let plugins = match field::<PluginConfig>(map, "plugins")? {
        Some(config) => Some(config),
        None => field::<PluginConfig>(map, "lora_settings")?,
    };

    let base = GenerationParams {
        width: field(map, "width")?.unwrap_or(DEFAULT_WIDTH),
        height: field(map, "height")?.unwrap_or(DEFAULT_HEIGHT),
        steps: field(map, "steps")?.unwrap_or(defaults.steps),
        cfg: field(map, "cfg")?.unwrap_or(defaults.cfg),
        seed: field(map, "seed")?.unwrap_or(DEFAULT_SEED),
        sampler: field(map, "sampler")?.unwrap_or_else(|| DEFAULT_SAMPLER.to_string()),
        scheduler: field(map, "scheduler")?.unwrap_or_else(|| DEFAULT_SCHEDULER.to_string()),
        prompt: field(map, "prompt")?.unwrap_or_else(|| defaults.prompt.to_string()),
        negative_prompt: field(map, "negative_prompt")?,
        plugins,
    };

    let set = match kind {
        ProcessKind::Portrait => ParameterSet::Portrait(base),
        ProcessKind::PortraitDetail => ParameterSet::PortraitDetail(base),
        ProcessKind::Pose => ParameterSet::Pose(base),
        ProcessKind::PoseDetail => ParameterSet::PoseDetail(base),
        ProcessKind::PortraitToPose => {
            let source_image = field::<String>(map, "source_image")?.ok_or_else(|| {
                CoreError::Validation("source_image is required for portrait_to_pose".to_string())
            })?;
            ParameterSet::PortraitToPose(PortraitToPoseParams { base, source_image })
        }
    };

    let checked = match &set {
        ParameterSet::PortraitToPose(p) => p.validate(),
        other => other.base().validate(),
    };
    checked.map_err(|errors| CoreError::Validation(describe(&errors)))?;

    Ok(set)
}

/// Read an optional field with its expected type. `null` counts as absent.
fn field<T: DeserializeOwned>(map: &Map<String, Value>, name: &str) -> Result<Option<T>, CoreError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("{name}: {e}"))),
    }
}

/// Flatten validator errors into `path: bound` messages joined by `; `.
fn describe(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect(errors, "", &mut messages);
    messages.sort();
    messages.join("; ")
}

/// Nested fields flattened into their parent on the wire.
const FLATTENED_FIELDS: &[&str] = &["base"];

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (name, kind) in errors.errors() {
        if let ValidationErrorsKind::Struct(nested) = kind {
            if FLATTENED_FIELDS.iter().any(|flat| name == flat) {
                collect(nested, prefix, out);
                continue;
            }
        }
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    out.push(format!("{path}: {}", bound_message(err)));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn bound_message(err: &validator::ValidationError) -> String {
    let param = |key: &str| err.params.get(key).map(|v| v.to_string());
    match err.code.as_ref() {
        "range" => match (param("min"), param("max"), param("value")) {
            (Some(min), Some(max), Some(value)) => {
                format!("must be between {min} and {max} (got {value})")
            }
            (Some(min), Some(max), None) => format!("must be between {min} and {max}"),
            _ => "out of range".to_string(),
        },
        "length" => "must not be empty".to_string(),
        other => format!("failed '{other}' check"),
    }
}
