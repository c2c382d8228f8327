//! Static table routing logical parameter names into template nodes.
//!
//! The table is built once on first use and never mutated afterwards.
//! Detail and portrait-to-pose variants are derived from their base entry
//! with overrides while the table is being constructed.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::process::ProcessKind;

/// Where a logical parameter lands inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTarget {
    pub node_id: &'static str,
    pub input_name: &'static str,
}

const fn slot(node_id: &'static str, input_name: &'static str) -> SlotTarget {
    SlotTarget {
        node_id,
        input_name,
    }
}

/// Everything the transformer and executor need to know about one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindMapping {
    pub fields: BTreeMap<&'static str, SlotTarget>,
    /// Node whose `finished` state means the requested image is ready.
    pub completion_node: &'static str,
    /// Plugin loader node, if the template supports plugins.
    pub plugin_node: Option<&'static str>,
}

impl KindMapping {
    fn derive(&self, completion_node: &'static str) -> Self {
        Self {
            completion_node,
            ..self.clone()
        }
    }

    fn with_field(mut self, name: &'static str, target: SlotTarget) -> Self {
        self.fields.insert(name, target);
        self
    }
}

const PORTRAIT_FIELDS: &[(&str, SlotTarget)] = &[
    ("width", slot("159", "value")),
    ("height", slot("160", "value")),
    ("cfg", slot("161", "value")),
    ("steps", slot("162", "value")),
    ("seed", slot("163", "seed")),
    ("sampler", slot("238", "sampler_name")),
    ("scheduler", slot("239", "choice")),
    ("prompt", slot("164", "text")),
    ("negative_prompt", slot("165", "text")),
];

const POSE_FIELDS: &[(&str, SlotTarget)] = &[
    ("width", slot("194", "value")),
    ("height", slot("195", "value")),
    ("cfg", slot("196", "value")),
    ("steps", slot("197", "value")),
    ("seed", slot("198", "seed")),
    ("sampler", slot("240", "sampler_name")),
    ("scheduler", slot("241", "choice")),
    ("prompt", slot("193", "text")),
    ("negative_prompt", slot("199", "text")),
];

static TABLE: LazyLock<HashMap<ProcessKind, KindMapping>> = LazyLock::new(build_table);

fn build_table() -> HashMap<ProcessKind, KindMapping> {
    let portrait = KindMapping {
        fields: PORTRAIT_FIELDS.iter().copied().collect(),
        completion_node: "170",
        plugin_node: Some("180"),
    };
    let pose = KindMapping {
        fields: POSE_FIELDS.iter().copied().collect(),
        completion_node: "205",
        plugin_node: Some("215"),
    };

    let portrait_detail = portrait.derive("220");
    let pose_detail = pose.derive("230");
    let portrait_to_pose = pose
        .derive("260")
        .with_field("source_image", slot("250", "image"));

    HashMap::from([
        (ProcessKind::Portrait, portrait),
        (ProcessKind::PortraitDetail, portrait_detail),
        (ProcessKind::Pose, pose),
        (ProcessKind::PoseDetail, pose_detail),
        (ProcessKind::PortraitToPose, portrait_to_pose),
    ])
}

/// Field-name to slot mapping for `kind`. Empty when the kind has no entry,
/// which callers must treat as a configuration error.
pub fn mapping_for(kind: ProcessKind) -> BTreeMap<&'static str, SlotTarget> {
    TABLE
        .get(&kind)
        .map(|entry| entry.fields.clone())
        .unwrap_or_default()
}

/// Node whose completion signals that the requested artifact is ready.
pub fn completion_sentinel_node(kind: ProcessKind) -> Option<&'static str> {
    TABLE.get(&kind).map(|entry| entry.completion_node)
}

/// Node hosting the plugin loader, absent for kinds without plugin support.
pub fn plugin_slot_node(kind: ProcessKind) -> Option<&'static str> {
    TABLE.get(&kind).and_then(|entry| entry.plugin_node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_an_entry() {
        for kind in ProcessKind::ALL {
            assert!(!mapping_for(kind).is_empty(), "{kind} has no mapping");
            assert!(completion_sentinel_node(kind).is_some());
        }
    }

    #[test]
    fn portrait_routes_width_to_value_input() {
        let mapping = mapping_for(ProcessKind::Portrait);
        assert_eq!(mapping["width"], slot("159", "value"));
        assert_eq!(mapping["seed"], slot("163", "seed"));
    }

    #[test]
    fn detail_variants_share_fields_but_not_sentinel() {
        assert_eq!(
            mapping_for(ProcessKind::PortraitDetail),
            mapping_for(ProcessKind::Portrait)
        );
        assert_ne!(
            completion_sentinel_node(ProcessKind::PortraitDetail),
            completion_sentinel_node(ProcessKind::Portrait)
        );
    }

    #[test]
    fn portrait_to_pose_adds_source_image_without_touching_pose() {
        let derived = mapping_for(ProcessKind::PortraitToPose);
        assert_eq!(derived["source_image"], slot("250", "image"));
        assert!(!mapping_for(ProcessKind::Pose).contains_key("source_image"));
        assert_eq!(
            plugin_slot_node(ProcessKind::PortraitToPose),
            plugin_slot_node(ProcessKind::Pose)
        );
    }
}
