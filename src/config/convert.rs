//! Module-to-Action Converter (4.E): translates legacy `Module` documents
//! into action configs via a plugin-provided `module.convert` handler.

use crate::config::{ActionConfig, DependencyRef};
use crate::error::GardenError;
use crate::plugin::Registry;
use crate::types::ActionKind;

/// A legacy `Module` document: one module typically yields a Build plus
/// per-service Deploys, per-task Runs, and per-test-config Tests.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

/// Converts `module` into its constituent actions by invoking the owning
/// plugin's `module.convert` handler. When another action depends on a
/// Build that the plugin chose not to emit (e.g. Helm's `skipDeploy`), the
/// caller (the graph builder) must drop the dangling dependency edge and
/// log a warning rather than fail — this function only produces the
/// action set, it does not see the broader dependency graph.
pub fn convert_module(module: &ModuleConfig, registry: &Registry) -> Result<Vec<ActionConfig>, GardenError> {
    registry.convert_module(module)
}

/// True if `actions` contains no enabled Build action named `build_name` —
/// signals the graph builder should drop a dangling `build:` dependency
/// rather than failing.
pub fn build_action_missing(actions: &[ActionConfig], build_name: &str) -> bool {
    !actions
        .iter()
        .any(|a| a.kind == ActionKind::Build && a.name == build_name && !a.disabled)
}

pub fn implicit_build_dependency(build_name: &str) -> DependencyRef {
    DependencyRef { kind: ActionKind::Build, name: build_name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Internal;
    use std::collections::BTreeMap;

    fn build(name: &str, disabled: bool) -> ActionConfig {
        ActionConfig {
            kind: ActionKind::Build,
            type_: "container".into(),
            name: name.into(),
            dependencies: vec![],
            disabled,
            source: None,
            include: vec![],
            exclude: vec![],
            variables: BTreeMap::new(),
            varfiles: vec![],
            timeout: None,
            build: None,
            spec: serde_yaml::Value::Null,
            internal: Internal::default(),
        }
    }

    #[test]
    fn detects_missing_build_action() {
        let actions = vec![build("other", false)];
        assert!(build_action_missing(&actions, "api"));
    }

    #[test]
    fn disabled_build_still_counts_as_missing() {
        let actions = vec![build("api", true)];
        assert!(build_action_missing(&actions, "api"));
    }

    #[test]
    fn present_enabled_build_is_not_missing() {
        let actions = vec![build("api", false)];
        assert!(!build_action_missing(&actions, "api"));
    }
}
