//! The engine's node-graph job document.
//!
//! A template maps node ids to nodes; each node has a class tag and a map
//! of named inputs whose values are scalars, nested objects, or
//! `[node_id, output_index]` references. Cloning a [`JobTemplate`] is a
//! full structural copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// A single node of a job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Engine class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Anything else the engine stored on the node (`_meta`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A job template keyed by node id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobTemplate {
    nodes: BTreeMap<String, WorkflowNode>,
}

impl JobTemplate {
    /// Parse a template from JSON, rejecting anything that is not a
    /// non-empty object of nodes with a `class_type`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if !value.is_object() {
            return Err(CoreError::TemplateFormat(
                "template must be a JSON object of nodes".to_string(),
            ));
        }
        let template: JobTemplate = serde_json::from_value(value)
            .map_err(|e| CoreError::TemplateFormat(e.to_string()))?;
        if template.is_empty() {
            return Err(CoreError::TemplateFormat(
                "template contains no nodes".to_string(),
            ));
        }
        Ok(template)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CoreError::TemplateFormat(e.to_string()))?;
        Self::from_value(value)
    }

    /// The document sent to the engine.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &WorkflowNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_nodes_and_keeps_meta() {
        let template = JobTemplate::from_value(json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {"seed": 42, "model": ["4", 0]},
                "_meta": {"title": "Sampler"}
            }
        }))
        .unwrap();

        let node = template.node("3").unwrap();
        assert_eq!(node.class_type, "KSampler");
        assert_eq!(node.inputs["model"], json!(["4", 0]));
        assert_eq!(template.to_value()["3"]["_meta"]["title"], "Sampler");
    }

    #[test]
    fn missing_class_type_is_a_format_error() {
        let err = JobTemplate::from_value(json!({"1": {"inputs": {}}})).unwrap_err();
        assert_matches!(err, CoreError::TemplateFormat(_));
    }

    #[test]
    fn non_object_and_empty_documents_are_rejected() {
        assert_matches!(
            JobTemplate::from_value(json!([1, 2])),
            Err(CoreError::TemplateFormat(_))
        );
        assert_matches!(
            JobTemplate::from_json_str("{}"),
            Err(CoreError::TemplateFormat(_))
        );
        assert_matches!(
            JobTemplate::from_json_str("not json"),
            Err(CoreError::TemplateFormat(_))
        );
    }
}
