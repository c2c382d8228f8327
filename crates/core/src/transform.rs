//! Applies a validated parameter set to a base template.
//!
//! [`transform`] never touches the base template: it works on a full copy,
//! writes mapped parameter values, then rewrites the plugin loader's
//! `lora_<n>` inputs. The only side effect is a warning log when the
//! mapping names a node the template does not contain.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::CoreError;
use crate::params::ParameterSet;
use crate::plugins::{resolve_plugins, PluginSlot};
use crate::slot_mapping::{mapping_for, plugin_slot_node};
use crate::template::JobTemplate;

/// Prefix of plugin-shaped inputs on the loader node.
pub const PLUGIN_INPUT_PREFIX: &str = "lora_";

static PLUGIN_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^lora_\d+$").expect("valid regex"));

/// Whether an input key/value pair is a plugin slot.
pub fn is_plugin_input(key: &str, value: &Value) -> bool {
    PLUGIN_INPUT_RE.is_match(key) && value.is_object()
}

/// Produce the executable job for `params` from `template`.
///
/// Fails with [`CoreError::Configuration`] when no slot mapping exists for
/// the parameter set's kind.
pub fn transform(template: &JobTemplate, params: &ParameterSet) -> Result<JobTemplate, CoreError> {
    let kind = params.kind();
    let mapping = mapping_for(kind);
    if mapping.is_empty() {
        return Err(CoreError::Configuration(format!(
            "No slot mapping registered for {kind}"
        )));
    }

    let mut job = template.clone();

    for (field, value) in params.slot_values() {
        if value.is_null() {
            continue;
        }
        let Some(target) = mapping.get(field) else {
            continue;
        };
        match job.node_mut(target.node_id) {
            Some(node) => {
                node.inputs.insert(target.input_name.to_string(), value);
            }
            None => {
                tracing::warn!(
                    kind = %kind,
                    field,
                    node_id = target.node_id,
                    "Mapped node not found in workflow template, skipping",
                );
            }
        }
    }

    if let (Some(config), Some(node_id)) = (params.plugins(), plugin_slot_node(kind)) {
        if let Some(node) = job.node_mut(node_id) {
            let slots = resolve_plugins(config);
            if !slots.is_empty() {
                disable_plugin_inputs(&mut node.inputs);
                write_plugin_slots(&mut node.inputs, &slots);
            } else if config.disables_plugins() {
                disable_plugin_inputs(&mut node.inputs);
            }
            // TODO: a non-`none` preset resolving to zero slots leaves the
            // template's own plugins active; decide whether it should disable.
        } else {
            tracing::warn!(
                kind = %kind,
                node_id,
                "Plugin loader node not found in workflow template, skipping",
            );
        }
    }

    Ok(job)
}

/// Turn every plugin-shaped input off, keeping its other fields.
fn disable_plugin_inputs(inputs: &mut Map<String, Value>) {
    for (key, value) in inputs.iter_mut() {
        if !PLUGIN_INPUT_RE.is_match(key) {
            continue;
        }
        if let Value::Object(slot) = value {
            slot.insert("on".to_string(), Value::Bool(false));
        }
    }
}

/// Write `slots` at `lora_1`, `lora_2`, ... replacing whatever was there.
fn write_plugin_slots(inputs: &mut Map<String, Value>, slots: &[PluginSlot]) {
    for (index, slot) in slots.iter().enumerate() {
        inputs.insert(
            format!("{PLUGIN_INPUT_PREFIX}{}", index + 1),
            json!({
                "on": slot.enabled,
                "lora": slot.reference,
                "strength": slot.strength,
            }),
        );
    }
}
