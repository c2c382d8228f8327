//! Resolves process kinds to template files and loads them.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::CoreError;
use crate::process::ProcessKind;
use crate::template::JobTemplate;

/// Built-in template file names, relative to the store's base directory.
pub const DEFAULT_TEMPLATE_FILES: &[(ProcessKind, &str)] = &[
    (ProcessKind::Portrait, "Portrait_wrkflw.json"),
    (ProcessKind::PortraitDetail, "Portrait_deteiler_wrkflw.json"),
    (ProcessKind::Pose, "Pose_wrkflw.json"),
    (ProcessKind::PoseDetail, "Pose_detailer_wrkflw.json"),
    (
        ProcessKind::PortraitToPose,
        "Pose_detailer_from_portrait_wrkflw.json",
    ),
];

/// Read-only access to the base templates on disk.
///
/// Every [`load`](Self::load) parses a fresh copy, so callers own their
/// template outright and concurrent executions never share nodes.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    base_dir: PathBuf,
    paths: HashMap<ProcessKind, PathBuf>,
}

impl TemplateStore {
    /// A store with the built-in file names under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(base_dir);
        for (kind, file) in DEFAULT_TEMPLATE_FILES {
            store.register_path(*kind, file);
        }
        store
    }

    /// A store with no registered paths.
    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            paths: HashMap::new(),
        }
    }

    /// Register (or replace) the template path for a kind. Relative paths
    /// are resolved against the base directory.
    pub fn register_path(&mut self, kind: ProcessKind, path: impl Into<PathBuf>) {
        self.paths.insert(kind, path.into());
    }

    /// Full path of the template for `kind`.
    pub fn resolve(&self, kind: ProcessKind) -> Result<PathBuf, CoreError> {
        let path = self.paths.get(&kind).ok_or_else(|| {
            CoreError::Configuration(format!("No workflow template registered for {kind}"))
        })?;
        if path.is_absolute() {
            Ok(path.clone())
        } else {
            Ok(self.base_dir.join(path))
        }
    }

    /// Read and parse the template for `kind`.
    pub async fn load(&self, kind: ProcessKind) -> Result<JobTemplate, CoreError> {
        let path = self.resolve(kind)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::NotFound(format!(
                    "Workflow file not found: {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read workflow {}: {e}",
                    path.display()
                )));
            }
        };

        let template = JobTemplate::from_json_str(&text).map_err(|e| match e {
            CoreError::TemplateFormat(msg) => {
                CoreError::TemplateFormat(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;

        tracing::debug!(
            kind = %kind,
            path = %path.display(),
            nodes = template.len(),
            "Loaded workflow template",
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn relative_paths_join_base_dir() {
        let store = TemplateStore::new("/srv/workflows");
        assert_eq!(
            store.resolve(ProcessKind::Pose).unwrap(),
            PathBuf::from("/srv/workflows/Pose_wrkflw.json")
        );
    }

    #[test]
    fn absolute_override_is_used_as_is() {
        let mut store = TemplateStore::new("/srv/workflows");
        store.register_path(ProcessKind::Portrait, "/opt/custom.json");
        assert_eq!(
            store.resolve(ProcessKind::Portrait).unwrap(),
            PathBuf::from("/opt/custom.json")
        );
    }

    #[test]
    fn unregistered_kind_is_a_configuration_error() {
        let store = TemplateStore::empty("/srv/workflows");
        assert_matches!(
            store.resolve(ProcessKind::Portrait),
            Err(CoreError::Configuration(_))
        );
    }

    #[tokio::test]
    async fn load_reports_missing_file_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        assert_matches!(
            store.load(ProcessKind::Portrait).await,
            Err(CoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn load_reports_garbage_as_format_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Pose_wrkflw.json"), "{ not json").unwrap();
        let store = TemplateStore::new(dir.path());
        assert_matches!(
            store.load(ProcessKind::Pose).await,
            Err(CoreError::TemplateFormat(_))
        );
    }

    #[tokio::test]
    async fn load_parses_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Pose_wrkflw.json"),
            r#"{"194": {"class_type": "PrimitiveInt", "inputs": {"value": 896}}}"#,
        )
        .unwrap();
        let store = TemplateStore::new(dir.path());

        let template = store.load(ProcessKind::Pose).await.unwrap();
        assert_eq!(template.node("194").unwrap().inputs["value"], 896);
    }

    #[tokio::test]
    async fn shipped_templates_carry_their_mapped_nodes() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../workflows");
        let store = TemplateStore::new(dir);

        for kind in ProcessKind::ALL {
            let template = store.load(kind).await.unwrap();
            for (field, target) in crate::slot_mapping::mapping_for(kind) {
                let node = template
                    .node(target.node_id)
                    .unwrap_or_else(|| panic!("{kind}: node {} for {field}", target.node_id));
                assert!(
                    node.inputs.contains_key(target.input_name),
                    "{kind}: {field} -> {}.{}",
                    target.node_id,
                    target.input_name
                );
            }
            let sentinel = crate::slot_mapping::completion_sentinel_node(kind).unwrap();
            assert!(template.node(sentinel).is_some(), "{kind}: sentinel {sentinel}");
            if let Some(plugin) = crate::slot_mapping::plugin_slot_node(kind) {
                assert!(template.node(plugin).is_some(), "{kind}: plugin {plugin}");
            }
        }
    }
}
