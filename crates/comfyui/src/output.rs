//! Per-node output ledger and artifact extraction.
//!
//! Outputs arrive from two places: `executed` push messages seen while
//! awaiting, and the `/history/{prompt_id}` document fetched once the job
//! is done. Both are folded into one [`OutputLedger`] keyed by node id.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Default `type` for engine-produced images.
pub const OUTPUT_IMAGE_TYPE: &str = "output";

/// Node id → node output document, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputLedger {
    entries: Vec<(String, Value)>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the output of a node.
    pub fn insert(&mut self, node_id: impl Into<String>, output: Value) {
        let node_id = node_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == node_id) {
            Some((_, existing)) => *existing = output,
            None => self.entries.push((node_id, output)),
        }
    }

    /// Merge the `outputs` of `prompt_id` from a history document.
    ///
    /// Nodes already buffered keep their position; the history copy wins
    /// on content. Returns the number of nodes merged.
    pub fn merge_history(&mut self, history: &Value, prompt_id: &str) -> usize {
        let Some(outputs) = history
            .get(prompt_id)
            .and_then(|entry| entry.get("outputs"))
            .and_then(Value::as_object)
        else {
            return 0;
        };

        for (node_id, output) in outputs {
            self.insert(node_id.clone(), output.clone());
        }
        outputs.len()
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, output)| output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, output)| (id.as_str(), output))
    }

    /// Ledger as a JSON object, used as response metadata in the run log.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(id, output)| (id.clone(), output.clone()))
            .collect();
        Value::Object(map)
    }
}

/// Reference to an image stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_image_type")]
    pub kind: String,
}

fn default_image_type() -> String {
    OUTPUT_IMAGE_TYPE.to_string()
}

impl ImageRef {
    /// Output image reference with the default `output` type.
    pub fn output(filename: impl Into<String>, subfolder: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            kind: default_image_type(),
        }
    }
}

/// First image in the ledger with a non-empty filename and subfolder.
///
/// Images saved to the root of the output directory (previews, temp files)
/// are skipped. The returned reference always has type `output`.
pub fn find_artifact(ledger: &OutputLedger) -> Option<ImageRef> {
    ledger.iter().find_map(|(_, output)| {
        output
            .get("images")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(|image| serde_json::from_value::<ImageRef>(image.clone()).ok())
            .find(|image| !image.filename.is_empty() && !image.subfolder.is_empty())
            .map(|image| ImageRef::output(image.filename, image.subfolder))
    })
}
