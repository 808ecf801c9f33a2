//! End-to-end coverage spanning the full pipeline: loading documents off
//! disk, validating them, building the action graph, and running the
//! Solver against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use garden_core::cache::ResultCache;
use garden_core::config::{load_project, ActionConfig, Validator};
use garden_core::error::PluginError;
use garden_core::graph::build_graph;
use garden_core::plugin::{ActionTypeDef, Handler, Registry};
use garden_core::solver::{CancelHandle, Solver};
use garden_core::types::ActionKind;

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn invoke(&self, action: &ActionConfig, _args: &serde_json::Value) -> Result<serde_json::Value, PluginError> {
        Ok(json!({"name": action.name}))
    }
}

fn registry_with_echo() -> Registry {
    let registry = Registry::new();
    registry.register_plugin("container", vec![ActionTypeDef { name: "container".into(), base: None, declared_outputs: HashMap::new() }]);
    for kind in [ActionKind::Build, ActionKind::Deploy, ActionKind::Run, ActionKind::Test] {
        let handler_name = match kind {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Run => "run",
            ActionKind::Test => "test",
        };
        registry.register_handler(kind, "container", handler_name, Arc::new(EchoHandler));
    }
    registry
}

fn write_doc(dir: &std::path::Path, file: &str, contents: &str) {
    std::fs::write(dir.join(file), contents).unwrap();
}

#[tokio::test]
async fn loaded_documents_build_a_valid_graph_with_transitive_dependency() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(
        dir.path(),
        "api.garden.yml",
        "kind: Build\nname: api\ntype: container\n---\nkind: Deploy\nname: api\ntype: container\ndependencies:\n  - kind: Build\n    name: api\n",
    );

    let documents = load_project(dir.path(), &[], &[]).unwrap();
    assert_eq!(documents.len(), 2);

    let validator = Validator::new();
    let actions: Vec<ActionConfig> = documents
        .iter()
        .filter(|d| d.kind.and_then(|k| k.as_action_kind()).is_some())
        .map(|d| {
            let mut a: ActionConfig = serde_yaml::from_value(d.raw.clone()).unwrap();
            a.internal.config_file_path = d.path.clone();
            a
        })
        .collect();
    assert!(actions.iter().flat_map(|a| validator.validate_action_config(a)).next().is_none());

    let registry = registry_with_echo();
    let report = build_graph(actions, &registry).await.unwrap();
    let order = report.graph.topological_order();
    let build_pos = order.iter().position(|r| r.to_string() == "Build.api").unwrap();
    let deploy_pos = order.iter().position(|r| r.to_string() == "Deploy.api").unwrap();
    assert!(build_pos < deploy_pos);
}

#[tokio::test]
async fn implicit_output_reference_in_spec_becomes_a_runtime_dependency() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(
        dir.path(),
        "api.garden.yml",
        "kind: Build\nname: api\ntype: container\nspec:\n  image: my/api\n---\nkind: Deploy\nname: api\ntype: container\nspec:\n  image: \"${actions.build.api.outputs.image}\"\n",
    );

    let documents = load_project(dir.path(), &[], &[]).unwrap();
    let actions: Vec<ActionConfig> = documents
        .iter()
        .map(|d| {
            let mut a: ActionConfig = serde_yaml::from_value(d.raw.clone()).unwrap();
            a.internal.config_file_path = d.path.clone();
            a
        })
        .collect();

    let registry = registry_with_echo();
    let report = build_graph(actions, &registry).await.unwrap();
    assert!(report.implicit_dependencies.iter().any(|d| d.from.to_string() == "Deploy.api" && d.on.to_string() == "Build.api"));
}

#[test]
fn duplicate_enabled_action_names_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "dup.garden.yml", "kind: Build\nname: api\ntype: container\n---\nkind: Build\nname: api\ntype: container\n");

    let documents = load_project(dir.path(), &[], &[]).unwrap();
    let actions: Vec<ActionConfig> = documents
        .iter()
        .map(|d| {
            let mut a: ActionConfig = serde_yaml::from_value(d.raw.clone()).unwrap();
            a.internal.config_file_path = d.path.clone();
            a
        })
        .collect();

    let validator = Validator::new();
    let errors = validator.detect_duplicate_actions(&actions);
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn full_pipeline_runs_build_then_deploy_through_the_solver() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(
        dir.path(),
        "svc.garden.yml",
        "kind: Build\nname: svc\ntype: container\n---\nkind: Deploy\nname: svc\ntype: container\ndependencies:\n  - kind: Build\n    name: svc\n",
    );

    let documents = load_project(dir.path(), &[], &[]).unwrap();
    let actions: Vec<ActionConfig> = documents
        .iter()
        .map(|d| {
            let mut a: ActionConfig = serde_yaml::from_value(d.raw.clone()).unwrap();
            a.internal.config_file_path = d.path.clone();
            a.timeout = Some(5);
            a
        })
        .collect();

    let registry = Arc::new(registry_with_echo());
    let report = build_graph(actions, &registry).await.unwrap();
    let graph = Arc::new(report.graph);
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(cache_dir.path().to_path_buf(), Duration::from_secs(3600)));

    let solver = Solver::new(graph, registry, cache, garden_core::limits::ResourceLimits::default());
    let solver_report = solver.run(CancelHandle::new()).await.unwrap();
    assert!(solver_report.succeeded());
}
