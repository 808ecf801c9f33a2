//! Action Graph Builder (4.F).
//!
//! Two passes over the flattened, enabled action set: first index every
//! action's `(kind, name) -> type`, then for each action merge its
//! explicit `dependencies`, its `build:` shorthand (dropped with a warning
//! when dangling, per the module-to-action converter's contract), and
//! implicit dependencies discovered by scanning `spec` for
//! `actions.<kind>.<name>.*` references in partial mode. The merged edge
//! set is topologically sorted with Kahn's algorithm; ties are broken by
//! `ActionRef`'s natural order (kind, then name) for a deterministic
//! build across runs.

use std::collections::BTreeMap;

use super::{Action, ConfigGraph};
use crate::config::convert::build_action_missing;
use crate::config::ActionConfig;
use crate::error::{ConfigurationError, GardenError, ValidationError};
use crate::plugin::{OutputKind, Registry};
use crate::template::{scan_interpolations, Expr, PathSegment};
use crate::types::{ActionKind, ActionName, ActionRef};
use crate::version::compute_action_version;

/// One implicit dependency edge discovered by the template scan, reported
/// back to the caller for diagnostics (e.g. `garden config graph --explain`).
#[derive(Debug, Clone)]
pub struct ImplicitDependency {
    pub from: ActionRef,
    pub on: ActionRef,
    pub needs_execution: bool,
}

pub struct BuildReport {
    pub graph: ConfigGraph,
    pub implicit_dependencies: Vec<ImplicitDependency>,
    pub warnings: Vec<String>,
}

pub async fn build_graph(configs: Vec<ActionConfig>, registry: &Registry) -> Result<BuildReport, GardenError> {
    let mut enabled: Vec<ActionConfig> = configs.into_iter().filter(|c| !c.disabled).collect();
    for cfg in &enabled {
        cfg.validate_include_exclude()?;
    }

    let augment_warnings = augment_graph(&mut enabled, registry).await?;
    for cfg in &enabled {
        cfg.validate_include_exclude()?;
    }

    let type_index: BTreeMap<(ActionKind, String), String> =
        enabled.iter().map(|c| (c.key(), c.type_.clone())).collect();
    let index: std::collections::HashSet<(ActionKind, String)> = type_index.keys().cloned().collect();

    let mut warnings = augment_warnings;
    let mut implicit_dependencies = Vec::new();
    let mut actions_map: BTreeMap<ActionRef, Action> = BTreeMap::new();
    let mut edges: BTreeMap<ActionRef, Vec<ActionRef>> = BTreeMap::new();

    for cfg in &enabled {
        let action_ref = ActionRef::new(cfg.kind, ActionName::new(cfg.name.clone()).map_err(ValidationError::from)?);
        let mut deps: Vec<ActionRef> = Vec::new();

        for d in &cfg.dependencies {
            if !index.contains(&(d.kind, d.name.clone())) {
                return Err(ConfigurationError::MissingDependencyTarget { kind: d.kind.to_string(), name: d.name.clone() }.into());
            }
            deps.push(ActionRef::new(d.kind, ActionName::new(d.name.clone()).map_err(ValidationError::from)?));
        }

        if let Some(build_name) = &cfg.build {
            if build_action_missing(&enabled, build_name) {
                warnings.push(format!(
                    "{} depends on build `{build_name}`, which is missing or disabled; dropping the implicit dependency",
                    action_ref
                ));
            } else {
                deps.push(ActionRef::new(ActionKind::Build, ActionName::new(build_name.clone()).map_err(ValidationError::from)?));
            }
        }

        let mut refs = Vec::new();
        scan_action_spec_for_refs(&cfg.spec, &mut refs)?;
        for (kind, name, output_key) in refs {
            if !index.contains(&(kind, name.clone())) {
                continue; // reference outside the graph; left for evaluation time to reject
            }
            let target_ref = ActionRef::new(kind, ActionName::new(name.clone()).map_err(ValidationError::from)?);
            if target_ref == action_ref {
                continue;
            }
            let needs_execution = match &output_key {
                Some(key) => type_index
                    .get(&(kind, name.clone()))
                    .and_then(|type_| registry.declared_output_kind(type_, type_, key))
                    .map(|k| k == OutputKind::Runtime)
                    .unwrap_or(true), // unknown plugin output: assume the conservative (runtime) case
                None => false,
            };

            if !deps.contains(&target_ref) {
                deps.push(target_ref.clone());
            }
            if let Some(_key) = &output_key {
                implicit_dependencies.push(ImplicitDependency { from: action_ref.clone(), on: target_ref, needs_execution });
            }
        }

        deps.sort();
        deps.dedup();
        edges.insert(action_ref.clone(), deps.clone());

        let action = Action {
            version: compute_action_version(cfg),
            resolved_include: cfg.normalised_include(),
            resolved_exclude: cfg.exclude.clone(),
            resolved_dependencies: deps,
            resolved_timeout: cfg.effective_timeout(),
            config: cfg.clone(),
        };
        actions_map.insert(action_ref, action);
    }

    let order = topological_order(&actions_map, &edges)?;

    Ok(BuildReport { graph: ConfigGraph { actions: actions_map, order }, implicit_dependencies, warnings })
}

/// Runs every registered plugin's `augmentGraph` handler once, in
/// lexicographic plugin-name order, letting each contribute additional
/// actions. A plugin may only add actions under keys nobody else has
/// claimed yet in this run (including keys claimed by an earlier
/// augmenter); claiming an existing key is a `ForeignAugmentation` error.
async fn augment_graph(enabled: &mut Vec<ActionConfig>, registry: &Registry) -> Result<Vec<String>, GardenError> {
    let mut warnings = Vec::new();
    let mut owners: BTreeMap<(ActionKind, String), String> =
        enabled.iter().map(|c| (c.key(), "user-declared".to_string())).collect();

    let plugin_types: std::collections::BTreeSet<String> = enabled.iter().map(|c| c.type_.clone()).collect();
    for plugin_name in plugin_types {
        let Some(handler) = registry.find_augmenter(&plugin_name) else { continue };
        let representative = enabled.iter().find(|c| c.type_ == plugin_name).expect("plugin type present").clone();

        let existing: Vec<serde_json::Value> = enabled
            .iter()
            .map(|c| serde_json::json!({"kind": c.kind.to_string(), "name": c.name, "type": c.type_}))
            .collect();
        let args = serde_json::json!({"actions": existing});

        let response = handler.invoke(&representative, &args).await?;
        let Some(additions) = response.get("add").and_then(|v| v.as_array()) else { continue };

        for raw in additions {
            let added: ActionConfig = serde_json::from_value(raw.clone())
                .map_err(|e| ConfigurationError::InvalidAugmentation { plugin: plugin_name.clone(), message: e.to_string() })?;
            let key = added.key();
            if let Some(owner) = owners.get(&key) {
                if owner != &plugin_name {
                    return Err(ConfigurationError::ForeignAugmentation {
                        plugin: plugin_name.clone(),
                        kind: added.kind.to_string(),
                        name: added.name.clone(),
                    }
                    .into());
                }
            }
            owners.insert(key, plugin_name.clone());
            warnings.push(format!("plugin `{plugin_name}` augmented the graph with {}.{}", added.kind, added.name));
            enabled.push(added);
        }
    }

    Ok(warnings)
}

fn scan_action_spec_for_refs(value: &serde_yaml::Value, refs: &mut Vec<(ActionKind, String, Option<String>)>) -> Result<(), GardenError> {
    match value {
        serde_yaml::Value::String(s) => {
            for span in scan_interpolations(s)? {
                let mut paths = Vec::new();
                collect_path_exprs(&span.expr, &mut paths);
                for segs in paths {
                    if let Some(found) = action_ref_from_segments(&segs) {
                        refs.push(found);
                    }
                }
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq {
                scan_action_spec_for_refs(v, refs)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map {
                scan_action_spec_for_refs(v, refs)?;
            }
        }
        serde_yaml::Value::Tagged(t) => scan_action_spec_for_refs(&t.value, refs)?,
        _ => {}
    }
    Ok(())
}

fn collect_path_exprs(expr: &Expr, out: &mut Vec<Vec<PathSegment>>) {
    match expr {
        Expr::Path(segs) => out.push(segs.clone()),
        Expr::Literal(_) => {}
        Expr::Array(items) => items.iter().for_each(|e| collect_path_exprs(e, out)),
        Expr::Call(_, args) => args.iter().for_each(|e| collect_path_exprs(e, out)),
        Expr::Unary(_, inner) => collect_path_exprs(inner, out),
        Expr::Binary(_, lhs, rhs) => {
            collect_path_exprs(lhs, out);
            collect_path_exprs(rhs, out);
        }
        Expr::Ternary(cond, then_branch, else_branch) => {
            collect_path_exprs(cond, out);
            collect_path_exprs(then_branch, out);
            collect_path_exprs(else_branch, out);
        }
    }
}

fn action_ref_from_segments(segs: &[PathSegment]) -> Option<(ActionKind, String, Option<String>)> {
    if segs.len() < 3 {
        return None;
    }
    matches!(&segs[0], PathSegment::Field(f) if f == "actions").then_some(())?;
    let kind_str = match &segs[1] {
        PathSegment::Field(f) => f,
        _ => return None,
    };
    let kind = parse_kind_loose(kind_str)?;
    let name = match &segs[2] {
        PathSegment::Field(f) => f.clone(),
        _ => return None,
    };
    let output_key = match (segs.get(3), segs.get(4)) {
        (Some(PathSegment::Field(f)), Some(PathSegment::Field(key))) if f == "outputs" => Some(key.clone()),
        _ => None,
    };
    Some((kind, name, output_key))
}

fn parse_kind_loose(s: &str) -> Option<ActionKind> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let capitalised: String = first.to_uppercase().chain(chars).collect();
    capitalised.parse().ok()
}

fn topological_order(
    actions: &BTreeMap<ActionRef, Action>,
    edges: &BTreeMap<ActionRef, Vec<ActionRef>>,
) -> Result<Vec<ActionRef>, GardenError> {
    let mut in_degree: BTreeMap<ActionRef, usize> = actions.keys().cloned().map(|k| (k, 0)).collect();
    let mut dependents: BTreeMap<ActionRef, Vec<ActionRef>> = BTreeMap::new();
    for (action, deps) in edges {
        *in_degree.get_mut(action).expect("action indexed") += deps.len();
        for dep in deps {
            dependents.entry(dep.clone()).or_default().push(action.clone());
        }
    }

    let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<ActionRef>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(action, _)| std::cmp::Reverse(action.clone()))
        .collect();

    let mut order = Vec::with_capacity(actions.len());
    while let Some(std::cmp::Reverse(current)) = ready.pop() {
        order.push(current.clone());
        if let Some(waiting_on_current) = dependents.get(&current) {
            for dependent in waiting_on_current {
                let degree = in_degree.get_mut(dependent).expect("dependent indexed");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(std::cmp::Reverse(dependent.clone()));
                }
            }
        }
    }

    if order.len() != actions.len() {
        let participants: Vec<String> = in_degree
            .iter()
            .filter(|(action, degree)| **degree > 0 && !order.contains(action))
            .map(|(action, _)| action.to_string())
            .collect();
        return Err(ValidationError::Cycle { participants: participants.join(", ") }.into());
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Internal;
    use std::collections::BTreeMap as Map;

    fn action(kind: ActionKind, name: &str, spec: serde_yaml::Value, dependencies: Vec<crate::config::DependencyRef>) -> ActionConfig {
        ActionConfig {
            kind,
            type_: "container".into(),
            name: name.into(),
            dependencies,
            disabled: false,
            source: None,
            include: vec![],
            exclude: vec![],
            variables: Map::new(),
            varfiles: vec![],
            timeout: None,
            build: None,
            spec,
            internal: Internal::default(),
        }
    }

    #[tokio::test]
    async fn transitive_explicit_dependency_orders_before_dependent() {
        let configs = vec![
            action(ActionKind::Build, "api", serde_yaml::Value::Null, vec![]),
            action(
                ActionKind::Deploy,
                "api",
                serde_yaml::Value::Null,
                vec![crate::config::DependencyRef { kind: ActionKind::Build, name: "api".into() }],
            ),
        ];
        let registry = Registry::new();
        let report = build_graph(configs, &registry).await.unwrap();
        let order = report.graph.topological_order();
        let build_pos = order.iter().position(|r| r.to_string() == "Build.api").unwrap();
        let deploy_pos = order.iter().position(|r| r.to_string() == "Deploy.api").unwrap();
        assert!(build_pos < deploy_pos);
    }

    #[tokio::test]
    async fn implicit_output_reference_promotes_to_dependency() {
        let spec: serde_yaml::Value = serde_yaml::from_str("image: \"${actions.build.api.outputs.image}\"\n").unwrap();
        let configs = vec![
            action(ActionKind::Build, "api", serde_yaml::Value::Null, vec![]),
            action(ActionKind::Deploy, "api", spec, vec![]),
        ];
        let registry = Registry::new();
        let report = build_graph(configs, &registry).await.unwrap();
        assert_eq!(report.implicit_dependencies.len(), 1);
        assert!(report.graph.dependencies_of(&ActionRef::new(ActionKind::Deploy, ActionName::new("api").unwrap()))
            .iter()
            .any(|r| r.to_string() == "Build.api"));
    }

    #[tokio::test]
    async fn dangling_build_dependency_drops_with_warning_not_failure() {
        let configs = vec![action(ActionKind::Deploy, "api", serde_yaml::Value::Null, vec![])];
        let mut cfg = configs[0].clone();
        cfg.build = Some("missing".into());
        let registry = Registry::new();
        let report = build_graph(vec![cfg], &registry).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn dependency_cycle_is_rejected() {
        let a = action(
            ActionKind::Run,
            "a",
            serde_yaml::Value::Null,
            vec![crate::config::DependencyRef { kind: ActionKind::Run, name: "b".into() }],
        );
        let b = action(
            ActionKind::Run,
            "b",
            serde_yaml::Value::Null,
            vec![crate::config::DependencyRef { kind: ActionKind::Run, name: "a".into() }],
        );
        let registry = Registry::new();
        let result = build_graph(vec![a, b], &registry).await;
        assert!(matches!(result, Err(GardenError::Validation(ValidationError::Cycle { .. }))));
    }

    #[tokio::test]
    async fn missing_dependency_target_is_configuration_error() {
        let configs = vec![action(
            ActionKind::Run,
            "a",
            serde_yaml::Value::Null,
            vec![crate::config::DependencyRef { kind: ActionKind::Build, name: "ghost".into() }],
        )];
        let registry = Registry::new();
        let result = build_graph(configs, &registry).await;
        assert!(matches!(result, Err(GardenError::Configuration(ConfigurationError::MissingDependencyTarget { .. }))));
    }

    struct AddSidecarAugmenter;

    #[async_trait::async_trait]
    impl crate::plugin::Handler for AddSidecarAugmenter {
        async fn invoke(&self, _action: &ActionConfig, _args: &serde_json::Value) -> Result<serde_json::Value, crate::error::PluginError> {
            Ok(serde_json::json!({"add": [{
                "kind": "Run",
                "type": "container",
                "name": "sidecar",
            }]}))
        }
    }

    #[tokio::test]
    async fn augmenter_adds_a_new_action_to_the_graph() {
        let configs = vec![action(ActionKind::Build, "api", serde_yaml::Value::Null, vec![])];
        let registry = Registry::new();
        registry.register_augmenter("container", std::sync::Arc::new(AddSidecarAugmenter));
        let report = build_graph(configs, &registry).await.unwrap();
        assert!(report.graph.get(&ActionRef::new(ActionKind::Run, ActionName::new("sidecar").unwrap())).is_some());
        assert_eq!(report.warnings.len(), 1);
    }

    struct ClaimBuildApiAugmenter;

    #[async_trait::async_trait]
    impl crate::plugin::Handler for ClaimBuildApiAugmenter {
        async fn invoke(&self, _action: &ActionConfig, _args: &serde_json::Value) -> Result<serde_json::Value, crate::error::PluginError> {
            Ok(serde_json::json!({"add": [{
                "kind": "Build",
                "type": "container",
                "name": "api",
            }]}))
        }
    }

    #[tokio::test]
    async fn augmenter_cannot_claim_a_user_declared_action() {
        let configs = vec![action(ActionKind::Build, "api", serde_yaml::Value::Null, vec![])];
        let registry = Registry::new();
        registry.register_augmenter("container", std::sync::Arc::new(ClaimBuildApiAugmenter));
        let result = build_graph(configs, &registry).await;
        assert!(matches!(result, Err(GardenError::Configuration(ConfigurationError::ForeignAugmentation { .. }))));
    }
}
