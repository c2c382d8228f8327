//! Domain core for the portrait/pose generation front-end.
//!
//! Everything here is pure apart from template file reads: parameter
//! validation, plugin resolution, the slot mapping table, template
//! transformation and request fingerprints.

pub mod error;
pub mod hashing;
pub mod params;
pub mod plugins;
pub mod process;
pub mod slot_mapping;
pub mod template;
pub mod template_store;
pub mod transform;
pub mod types;
