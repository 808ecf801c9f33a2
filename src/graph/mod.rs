//! Action Graph Builder (4.F) and the lifecycle types from §3
//! (`Action` → `ResolvedAction` → `ExecutedAction`).

mod builder;

pub use builder::{build_graph, BuildReport, ImplicitDependency};

use std::collections::BTreeMap;

use crate::config::ActionConfig;
use crate::template::TemplateValue;
use crate::types::{ActionKind, ActionRef, Mode, Version};

/// An `ActionConfig` after phase-1 preprocessing: framework-level fields
/// resolved, `spec`/`variables` still lazy.
#[derive(Debug, Clone)]
pub struct Action {
    pub config: ActionConfig,
    pub version: Version,
    pub resolved_include: Vec<String>,
    pub resolved_exclude: Vec<String>,
    pub resolved_dependencies: Vec<ActionRef>,
    pub resolved_timeout: u64,
}

impl Action {
    pub fn action_ref(&self) -> ActionRef {
        ActionRef::new(self.config.kind, crate::types::ActionName::new(self.config.name.clone()).expect("validated at load time"))
    }

    pub fn mode(&self) -> Mode {
        self.config.internal.mode
    }

    pub fn is_compatible(&self, type_: &str) -> bool {
        self.config.type_ == type_
    }
}

/// An `Action` whose `spec` and `variables` have been fully resolved
/// against a context enriched with dependency outputs.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub action_ref: ActionRef,
    pub version: Version,
    pub spec: TemplateValue,
    pub variables: BTreeMap<String, TemplateValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Ready,
    NotReady,
    Processing,
    Failed,
    Unknown,
    Outdated,
}

/// A `ResolvedAction` paired with its runtime outputs and execution state.
#[derive(Debug, Clone)]
pub struct ExecutedAction {
    pub action_ref: ActionRef,
    pub state: ExecutionState,
    pub outputs: BTreeMap<String, TemplateValue>,
}

/// Immutable, indexed DAG of preprocessed actions, frozen after phase 1
/// (including `augmentGraph`). Lookups are O(1); dependency traversal is
/// O(edges).
#[derive(Debug, Clone, Default)]
pub struct ConfigGraph {
    actions: BTreeMap<ActionRef, Action>,
    order: Vec<ActionRef>,
}

impl ConfigGraph {
    pub fn get(&self, key: &ActionRef) -> Option<&Action> {
        self.actions.get(key)
    }

    pub fn contains(&self, key: &ActionRef) -> bool {
        self.actions.contains_key(key)
    }

    pub fn dependencies_of(&self, key: &ActionRef) -> &[ActionRef] {
        self.actions.get(key).map(|a| a.resolved_dependencies.as_slice()).unwrap_or(&[])
    }

    /// Topological order computed at build time (Kahn's algorithm over the
    /// merged explicit+implicit edge set).
    pub fn topological_order(&self) -> &[ActionRef] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActionRef, &Action)> {
        self.actions.iter()
    }

    pub fn kind_filtered(&self, kind: ActionKind) -> impl Iterator<Item = &Action> {
        self.actions.values().filter(move |a| a.config.kind == kind)
    }
}
