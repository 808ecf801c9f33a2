//! Plugin/Handler Registry (4.I).
//!
//! A plugin declares a name, an optional config schema, a set of action
//! type definitions, and handlers keyed by `(action-kind, action-type,
//! handler-name)`. Generalizes the `Provider` trait + factory pattern this
//! codebase already uses for its fixed provider list into an open,
//! pluggable set with type-inheritance fallthrough.

mod tools;

pub use tools::{PluginTool, ToolCache};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::config::convert::ModuleConfig;
use crate::config::ActionConfig;
use crate::error::{ConfigurationError, GardenError, PluginError};
use crate::types::ActionKind;

/// One realised operation a plugin exposes for an action type. Handler
/// names mirror the fixed set the engine dispatches by name: `configure`,
/// `validate`, `getOutputs`, `build`, `getStatus`, `deploy`, `delete`,
/// `getLogs`, `run`, `test`, `publish`, `exec`, `getSyncStatus`,
/// `startSync`, `stopSync`, `augmentGraph`, `suggestCommands`,
/// `module.convert`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, action: &ActionConfig, args: &JsonValue) -> Result<JsonValue, PluginError>;
}

/// Declares whether an output is known at config-resolution time (static)
/// or only after the action executes (runtime) — drives the implicit
/// dependency classification in the graph builder (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Static,
    Runtime,
}

/// One action type a plugin contributes, with optional inheritance from a
/// base type. Handler lookup falls through to the base type when the
/// concrete type has no override for a given handler name.
#[derive(Clone, Default)]
pub struct ActionTypeDef {
    pub name: String,
    pub base: Option<String>,
    pub declared_outputs: HashMap<String, OutputKind>,
}

struct PluginDef {
    name: String,
    action_types: HashMap<String, ActionTypeDef>,
    module_convert: Option<Arc<dyn Fn(&ModuleConfig) -> Result<Vec<ActionConfig>, GardenError> + Send + Sync>>,
}

/// `(action-kind, action-type, handler-name) -> Handler` dispatch table,
/// plus the plugin tool cache.
pub struct Registry {
    plugins: DashMap<String, Arc<PluginDef>>,
    handlers: DashMap<(ActionKind, String, &'static str), Arc<dyn Handler>>,
    augmenters: DashMap<String, Arc<dyn Handler>>,
    pub tools: ToolCache,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry { plugins: DashMap::new(), handlers: DashMap::new(), augmenters: DashMap::new(), tools: ToolCache::new() }
    }

    pub fn register_plugin(&self, name: &str, action_types: Vec<ActionTypeDef>) {
        let def = PluginDef {
            name: name.to_string(),
            action_types: action_types.into_iter().map(|t| (t.name.clone(), t)).collect(),
            module_convert: None,
        };
        self.plugins.insert(name.to_string(), Arc::new(def));
    }

    pub fn register_handler(&self, kind: ActionKind, action_type: &str, handler_name: &'static str, handler: Arc<dyn Handler>) {
        self.handlers.insert((kind, action_type.to_string(), handler_name), handler);
    }

    /// Looks up a handler for `(kind, type)`, falling through the type's
    /// inheritance chain (bounded to avoid infinite loops from a
    /// misconfigured `base` cycle).
    pub fn find_handler(&self, plugin_name: &str, kind: ActionKind, action_type: &str, handler_name: &'static str) -> Option<Arc<dyn Handler>> {
        let plugin = self.plugins.get(plugin_name)?;
        let mut current = action_type.to_string();
        let mut hops = 0;
        loop {
            if let Some(h) = self.handlers.get(&(kind, current.clone(), handler_name)) {
                return Some(h.clone());
            }
            let type_def = plugin.action_types.get(&current)?;
            match &type_def.base {
                Some(base) if hops < 16 => {
                    current = base.clone();
                    hops += 1;
                }
                _ => return None,
            }
        }
    }

    /// Registers a plugin-level `augmentGraph` handler, invoked once per
    /// plugin during graph building rather than per `(kind, type)` pair.
    pub fn register_augmenter(&self, plugin_name: &str, handler: Arc<dyn Handler>) {
        self.augmenters.insert(plugin_name.to_string(), handler);
    }

    pub fn find_augmenter(&self, plugin_name: &str) -> Option<Arc<dyn Handler>> {
        self.augmenters.get(plugin_name).map(|h| h.clone())
    }

    pub fn declared_output_kind(&self, plugin_name: &str, action_type: &str, output: &str) -> Option<OutputKind> {
        let plugin = self.plugins.get(plugin_name)?;
        let mut current = action_type.to_string();
        let mut hops = 0;
        loop {
            let type_def = plugin.action_types.get(&current)?;
            if let Some(kind) = type_def.declared_outputs.get(output) {
                return Some(*kind);
            }
            match &type_def.base {
                Some(base) if hops < 16 => {
                    current = base.clone();
                    hops += 1;
                }
                _ => return None,
            }
        }
    }

    pub fn convert_module(&self, module: &ModuleConfig) -> Result<Vec<ActionConfig>, GardenError> {
        let plugin = self
            .plugins
            .get(&module.type_)
            .ok_or_else(|| ConfigurationError::UnknownActionType { kind: "Module".into(), type_: module.type_.clone() })?;
        match &plugin.module_convert {
            Some(f) => f(module),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn invoke(&self, _action: &ActionConfig, args: &JsonValue) -> Result<JsonValue, PluginError> {
            Ok(args.clone())
        }
    }

    #[test]
    fn handler_lookup_falls_through_base_type() {
        let registry = Registry::new();
        registry.register_plugin(
            "container",
            vec![
                ActionTypeDef { name: "base".into(), base: None, declared_outputs: HashMap::new() },
                ActionTypeDef { name: "kubernetes".into(), base: Some("base".into()), declared_outputs: HashMap::new() },
            ],
        );
        registry.register_handler(ActionKind::Deploy, "base", "deploy", Arc::new(EchoHandler));

        let found = registry.find_handler("container", ActionKind::Deploy, "kubernetes", "deploy");
        assert!(found.is_some());
    }

    #[test]
    fn handler_lookup_misses_without_override_or_base() {
        let registry = Registry::new();
        registry.register_plugin("container", vec![ActionTypeDef { name: "base".into(), base: None, declared_outputs: HashMap::new() }]);
        assert!(registry.find_handler("container", ActionKind::Deploy, "base", "deploy").is_none());
    }

    #[test]
    fn augmenter_lookup_is_per_plugin_not_per_kind() {
        let registry = Registry::new();
        assert!(registry.find_augmenter("container").is_none());
        registry.register_augmenter("container", Arc::new(EchoHandler));
        assert!(registry.find_augmenter("container").is_some());
        assert!(registry.find_augmenter("terraform").is_none());
    }

    #[test]
    fn declared_output_kind_inherits_from_base() {
        let registry = Registry::new();
        let mut outputs = HashMap::new();
        outputs.insert("image".to_string(), OutputKind::Static);
        registry.register_plugin(
            "container",
            vec![
                ActionTypeDef { name: "base".into(), base: None, declared_outputs: outputs },
                ActionTypeDef { name: "kubernetes".into(), base: Some("base".into()), declared_outputs: HashMap::new() },
            ],
        );
        assert_eq!(registry.declared_output_kind("container", "kubernetes", "image"), Some(OutputKind::Static));
    }
}
