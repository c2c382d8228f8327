//! Plugin ("LoRA") configuration and preset resolution.
//!
//! A request selects plugins either by naming a preset, by listing slots
//! explicitly, or both. [`resolve_plugins`] flattens that into the ordered
//! slot list written into a template's plugin-loader node.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lower bound for a slot strength.
pub const MIN_PLUGIN_STRENGTH: f64 = -2.0;
/// Upper bound for a slot strength.
pub const MAX_PLUGIN_STRENGTH: f64 = 2.0;

/// Named plugin presets.
///
/// `None` explicitly selects "no plugins"; `Custom` means "only the slots I
/// list". Both contribute zero preset slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginPreset {
    None,
    #[default]
    Custom,
    Realistic,
    Cinematic,
    Anime,
}

/// One plugin applied to the loader node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PluginSlot {
    #[serde(default = "default_enabled", alias = "on")]
    pub enabled: bool,
    /// Asset name of the plugin on the engine side.
    #[serde(alias = "lora")]
    #[validate(length(min = 1))]
    pub reference: String,
    #[serde(default = "default_strength")]
    #[validate(range(min = MIN_PLUGIN_STRENGTH, max = MAX_PLUGIN_STRENGTH))]
    pub strength: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_strength() -> f64 {
    1.0
}

impl PluginSlot {
    pub fn new(reference: impl Into<String>, strength: f64) -> Self {
        Self {
            enabled: true,
            reference: reference.into(),
            strength,
        }
    }
}

/// Plugin selection carried by a parameter set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct PluginConfig {
    #[serde(default)]
    pub preset: PluginPreset,
    #[serde(default)]
    #[validate(nested)]
    pub slots: Vec<PluginSlot>,
}

impl PluginConfig {
    /// Whether this configuration explicitly asks for no plugins at all.
    pub fn disables_plugins(&self) -> bool {
        self.preset == PluginPreset::None
    }
}

// ---------------------------------------------------------------------------
// Preset table
// ---------------------------------------------------------------------------

const REALISTIC_SLOTS: &[(&str, f64)] = &[
    ("realistic_skin_texture_v2.safetensors", 0.8),
    ("add_detail_xl.safetensors", 0.5),
];

const CINEMATIC_SLOTS: &[(&str, f64)] = &[("cinematic_lighting_v1.safetensors", 0.7)];

const ANIME_SLOTS: &[(&str, f64)] = &[
    ("anime_lineart_xl.safetensors", 0.9),
    ("flat_color_v3.safetensors", 0.6),
];

/// Slots predefined for a preset. `None` and `Custom` have none.
pub fn preset_slots(preset: PluginPreset) -> Vec<PluginSlot> {
    let table: &[(&str, f64)] = match preset {
        PluginPreset::None | PluginPreset::Custom => &[],
        PluginPreset::Realistic => REALISTIC_SLOTS,
        PluginPreset::Cinematic => CINEMATIC_SLOTS,
        PluginPreset::Anime => ANIME_SLOTS,
    };
    table
        .iter()
        .map(|(reference, strength)| PluginSlot::new(*reference, *strength))
        .collect()
}

/// Resolve a configuration to its concrete slot list: preset slots first,
/// then the explicit slots in the order given.
pub fn resolve_plugins(config: &PluginConfig) -> Vec<PluginSlot> {
    let mut slots = preset_slots(config.preset);
    slots.extend(config.slots.iter().cloned());
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realistic_preset_plus_explicit_slot_resolves_to_three_in_order() {
        let config = PluginConfig {
            preset: PluginPreset::Realistic,
            slots: vec![PluginSlot::new("my_face.safetensors", 1.2)],
        };

        let resolved = resolve_plugins(&config);

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].reference, "realistic_skin_texture_v2.safetensors");
        assert_eq!(resolved[1].reference, "add_detail_xl.safetensors");
        assert_eq!(resolved[2].reference, "my_face.safetensors");
        assert_eq!(resolved[2].strength, 1.2);
    }

    #[test]
    fn none_and_custom_contribute_no_preset_slots() {
        assert!(preset_slots(PluginPreset::None).is_empty());
        assert!(preset_slots(PluginPreset::Custom).is_empty());

        let custom = PluginConfig {
            preset: PluginPreset::Custom,
            slots: vec![PluginSlot::new("a.safetensors", 0.3)],
        };
        assert_eq!(resolve_plugins(&custom), custom.slots);
    }

    #[test]
    fn only_the_none_preset_disables_plugins() {
        let none = PluginConfig {
            preset: PluginPreset::None,
            slots: Vec::new(),
        };
        assert!(none.disables_plugins());
        assert!(!PluginConfig::default().disables_plugins());
    }

    #[test]
    fn slot_accepts_loader_style_field_names() {
        let slot: PluginSlot =
            serde_json::from_str(r#"{"on": false, "lora": "x.safetensors", "strength": 0.4}"#)
                .unwrap();
        assert!(!slot.enabled);
        assert_eq!(slot.reference, "x.safetensors");
    }

    #[test]
    fn out_of_range_strength_fails_validation() {
        let config = PluginConfig {
            preset: PluginPreset::Custom,
            slots: vec![PluginSlot::new("x.safetensors", 3.5)],
        };
        assert!(config.validate().is_err());
    }
}
