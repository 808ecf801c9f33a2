//! Template Context Hierarchy.
//!
//! A context is a lookup object implementing `resolve(path) -> TemplateValue
//! | absent`. Contexts compose by nesting: resolution walks inner → outer,
//! mirroring the read-only/read-write trait split used for execution state
//! elsewhere in this codebase (a plain reader for evaluation, a narrower
//! writer capability for the one place data is produced — an action's
//! `outputs` map once it finishes).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::template::TemplateValue;

/// Read-only resolution contract every context layer implements.
/// `path` is the dotted identifier path with the leading segment already
/// consumed by the caller where relevant (e.g. `"var.foo"` resolves
/// `foo` under the `var` namespace).
pub trait ContextReader: Send + Sync {
    fn resolve(&self, path: &str) -> Option<TemplateValue>;
}

/// A simple leaf context backed by a flat key → value map, keyed by full
/// dotted path. Used for tests and for the Project layer's literal keys.
#[derive(Debug, Default, Clone)]
pub struct StaticContext {
    values: BTreeMap<String, TemplateValue>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut ctx = StaticContext::new();
        for (k, v) in pairs {
            ctx.set(k, TemplateValue::string(v));
        }
        ctx
    }

    pub fn set(&mut self, path: impl Into<String>, value: TemplateValue) {
        self.values.insert(path.into(), value);
    }
}

impl ContextReader for StaticContext {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        self.values.get(path).cloned()
    }
}

/// Chains an inner context in front of an outer one: inner is consulted
/// first, falling back to outer on a miss. This is how the five standard
/// contexts (Project → Environment → Provider → Action → ActionSpec)
/// compose with strictly increasing scope.
pub struct ChainedContext<'a> {
    inner: &'a dyn ContextReader,
    outer: &'a dyn ContextReader,
}

impl<'a> ChainedContext<'a> {
    pub fn new(inner: &'a dyn ContextReader, outer: &'a dyn ContextReader) -> Self {
        ChainedContext { inner, outer }
    }
}

impl<'a> ContextReader for ChainedContext<'a> {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        self.inner.resolve(path).or_else(|| self.outer.resolve(path))
    }
}

/// Project-layer keys: `project.*`, `local.*`, `environment.*`, `var.*`,
/// `datetime.*`, `git.*`.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub project_name: Arc<str>,
    pub project_path: Arc<str>,
    pub environment_name: Arc<str>,
    pub environment_namespace: Arc<str>,
    /// Fully-resolved `var.*` map, precedence already applied by the
    /// caller (see [`resolve_variable_precedence`]).
    pub variables: BTreeMap<String, TemplateValue>,
    pub local_username: Arc<str>,
    pub local_platform: Arc<str>,
    pub git_branch: Option<Arc<str>>,
}

impl ContextReader for ProjectContext {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        if let Some(rest) = path.strip_prefix("var.") {
            return self.variables.get(rest).cloned();
        }
        match path {
            "project.name" => Some(TemplateValue::String(self.project_name.clone())),
            "project.path" => Some(TemplateValue::String(self.project_path.clone())),
            "environment.name" => Some(TemplateValue::String(self.environment_name.clone())),
            "environment.namespace" => Some(TemplateValue::String(self.environment_namespace.clone())),
            "local.username" => Some(TemplateValue::String(self.local_username.clone())),
            "local.platform" => Some(TemplateValue::String(self.local_platform.clone())),
            "local.env" => Some(TemplateValue::string(std::env::consts::OS)),
            "git.branch" => self.git_branch.clone().map(TemplateValue::String),
            _ => None,
        }
    }
}

/// Environment layer adds `secrets.*` on top of the project layer.
pub struct EnvironmentContext<'a> {
    pub project: &'a ProjectContext,
    pub secrets: BTreeMap<String, TemplateValue>,
}

impl<'a> ContextReader for EnvironmentContext<'a> {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        if let Some(rest) = path.strip_prefix("secrets.") {
            return self.secrets.get(rest).cloned();
        }
        self.project.resolve(path)
    }
}

/// Provider layer adds `providers.<name>.outputs.*`, restricted to
/// declared provider dependencies (the caller only populates entries the
/// consuming provider actually depends on).
pub struct ProviderContext<'a> {
    pub environment: &'a EnvironmentContext<'a>,
    pub provider_outputs: BTreeMap<String, BTreeMap<String, TemplateValue>>,
}

impl<'a> ContextReader for ProviderContext<'a> {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        if let Some(rest) = path.strip_prefix("providers.") {
            let (name, tail) = rest.split_once('.')?;
            let tail = tail.strip_prefix("outputs.")?;
            return self.provider_outputs.get(name)?.get(tail).cloned();
        }
        self.environment.resolve(path)
    }
}

/// Preprocess-time Action layer: provider keys plus per-action
/// `actions.<kind>.<name>.{version,sourcePath,buildPath,disabled,mode}`
/// and `inputs.*` for template-rendered configs.
pub struct ActionContext<'a> {
    pub provider: &'a ProviderContext<'a>,
    pub action_meta: BTreeMap<(String, String), BTreeMap<String, TemplateValue>>,
    pub inputs: BTreeMap<String, TemplateValue>,
}

impl<'a> ContextReader for ActionContext<'a> {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        if let Some(rest) = path.strip_prefix("inputs.") {
            return self.inputs.get(rest).cloned();
        }
        if let Some(rest) = path.strip_prefix("actions.") {
            let mut parts = rest.splitn(3, '.');
            let kind = parts.next()?;
            let name = parts.next()?;
            let field = parts.next()?;
            if field.starts_with("outputs.") {
                return None; // not yet available at this layer
            }
            return self
                .action_meta
                .get(&(kind.to_string(), name.to_string()))?
                .get(field)
                .cloned();
        }
        self.provider.resolve(path)
    }
}

/// Full ActionSpec layer: action keys plus
/// `actions.<kind>.<name>.outputs.*` (static or runtime) and
/// `runtime.services.*` legacy compatibility keys.
pub struct ActionSpecContext<'a> {
    pub action: &'a ActionContext<'a>,
    pub outputs: BTreeMap<(String, String), BTreeMap<String, TemplateValue>>,
    pub runtime_services: BTreeMap<String, TemplateValue>,
}

impl<'a> ContextReader for ActionSpecContext<'a> {
    fn resolve(&self, path: &str) -> Option<TemplateValue> {
        if let Some(rest) = path.strip_prefix("runtime.services.") {
            return self.runtime_services.get(rest).cloned();
        }
        if let Some(rest) = path.strip_prefix("actions.") {
            let mut parts = rest.splitn(4, '.');
            let kind = parts.next()?;
            let name = parts.next()?;
            let field = parts.next()?;
            if field == "outputs" {
                let output_key = parts.next()?;
                return self.outputs.get(&(kind.to_string(), name.to_string()))?.get(output_key).cloned();
            }
        }
        self.action.resolve(path)
    }
}

/// Precedence inside `var.*`: CLI override > action variables > action
/// varfiles (later varfile wins) > group variables > environment
/// variables > project variables. Overrides shadow defaults but must not
/// be written back into the action's own `variables` field — callers
/// must keep the two maps distinct (see the Action type in `config`).
pub fn resolve_variable_precedence(
    project_vars: &BTreeMap<String, TemplateValue>,
    environment_vars: &BTreeMap<String, TemplateValue>,
    group_vars: &BTreeMap<String, TemplateValue>,
    varfiles: &[BTreeMap<String, TemplateValue>],
    action_vars: &BTreeMap<String, TemplateValue>,
    cli_overrides: &BTreeMap<String, TemplateValue>,
) -> BTreeMap<String, TemplateValue> {
    let mut merged = project_vars.clone();
    merged.extend(environment_vars.clone());
    merged.extend(group_vars.clone());
    for varfile in varfiles {
        merged.extend(varfile.clone());
    }
    merged.extend(action_vars.clone());
    merged.extend(cli_overrides.clone());
    merged
}
