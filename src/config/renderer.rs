//! Config-Template Renderer (4.D): expands `ConfigTemplate`/
//! `RenderTemplate` documents into concrete action/module configs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::{ContextReader, StaticContext};
use crate::error::{ConfigurationError, GardenError};
use crate::template::{expand_structural, EvalMode, TemplateValue};

/// Declares named, typed inputs with optional defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub default: Option<serde_yaml::Value>,
}

/// A `ConfigTemplate` document: inputs schema plus a body emitting action
/// and/or module configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputSchema>,
    pub configs: serde_yaml::Value,
}

/// A `RenderTemplate` document: instantiates a named `ConfigTemplate` with
/// concrete inputs and a per-instance name prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTemplate {
    pub template: String,
    pub name: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_yaml::Value>,
}

/// Validates `instance.inputs` against `template.inputs`, applying
/// defaults, then renders `template.configs` against a context exposing
/// `inputs.*` plus the enclosing context, prefixing every emitted config
/// name with the instance name to prevent collisions.
pub fn render_template(
    template: &ConfigTemplate,
    instance: &RenderTemplate,
    enclosing: &dyn ContextReader,
) -> Result<Vec<serde_yaml::Value>, GardenError> {
    let mut resolved_inputs = BTreeMap::new();
    for input in &template.inputs {
        let value = instance
            .inputs
            .get(&input.name)
            .or(input.default.as_ref())
            .cloned();
        match value {
            Some(v) => {
                resolved_inputs.insert(input.name.clone(), TemplateValue::from_yaml(&v));
            }
            None if input.required => {
                return Err(ConfigurationError::MissingField {
                    kind: "ConfigTemplate".into(),
                    name: template.name.clone(),
                    field: input.name.clone(),
                }
                .into());
            }
            None => {}
        }
    }

    let mut input_ctx = StaticContext::new();
    for (k, v) in &resolved_inputs {
        input_ctx.set(format!("inputs.{k}"), v.clone());
    }
    let chained = crate::context::ChainedContext::new(&input_ctx, enclosing);

    let expanded = expand_structural(&template.configs, &chained, EvalMode::Strict)?;
    let mut configs = match expanded {
        serde_yaml::Value::Sequence(seq) => seq,
        other => vec![other],
    };

    for config in &mut configs {
        if let serde_yaml::Value::Mapping(map) = config {
            if let Some(serde_yaml::Value::String(name)) = map.get(serde_yaml::Value::String("name".into())).cloned() {
                let prefixed = format!("{}-{}", instance.name, name);
                map.insert(serde_yaml::Value::String("name".into()), serde_yaml::Value::String(prefixed));
            }
        }
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_names_are_prefixed_with_instance_name() {
        let template = ConfigTemplate {
            name: "svc".into(),
            inputs: vec![InputSchema { name: "port".into(), required: false, default: Some(serde_yaml::Value::Number(8080.into())) }],
            configs: serde_yaml::from_str("- kind: Deploy\n  name: web\n  type: container\n  spec:\n    port: \"${inputs.port}\"\n").unwrap(),
        };
        let instance = RenderTemplate { template: "svc".into(), name: "checkout".into(), inputs: BTreeMap::new() };
        let enclosing = StaticContext::new();
        let configs = render_template(&template, &instance, &enclosing).unwrap();
        assert_eq!(configs.len(), 1);
        let name = configs[0].get("name").unwrap().as_str().unwrap();
        assert_eq!(name, "checkout-web");
    }

    #[test]
    fn missing_required_input_is_configuration_error() {
        let template = ConfigTemplate {
            name: "svc".into(),
            inputs: vec![InputSchema { name: "port".into(), required: true, default: None }],
            configs: serde_yaml::Value::Sequence(vec![]),
        };
        let instance = RenderTemplate { template: "svc".into(), name: "checkout".into(), inputs: BTreeMap::new() };
        let enclosing = StaticContext::new();
        assert!(render_template(&template, &instance, &enclosing).is_err());
    }
}
