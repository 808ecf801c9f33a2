//! Config Loader & Validator (4.C), Config-Template Renderer (4.D), and
//! Module-to-Action Converter (4.E).

pub(crate) mod convert;
mod loader;
mod renderer;
mod validator;

pub use convert::{convert_module, ModuleConfig};
pub use loader::{load_project, RawDocument};
pub use renderer::{render_template, ConfigTemplate, RenderTemplate};
pub use validator::{ValidationResult, Validator};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{ActionKind, Mode};

/// `kind` discriminant for every document the loader recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    Project,
    Command,
    Workflow,
    Module,
    Build,
    Deploy,
    Run,
    Test,
    Group,
    ConfigTemplate,
    RenderTemplate,
}

impl DocumentKind {
    pub fn as_action_kind(self) -> Option<ActionKind> {
        match self {
            DocumentKind::Build => Some(ActionKind::Build),
            DocumentKind::Deploy => Some(ActionKind::Deploy),
            DocumentKind::Run => Some(ActionKind::Run),
            DocumentKind::Test => Some(ActionKind::Test),
            _ => None,
        }
    }
}

/// Engine-managed fields attached to every loaded document, per §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Internal {
    pub base_path: PathBuf,
    pub config_file_path: PathBuf,
    pub group_name: Option<String>,
    pub mode: Mode,
}

/// A declarative action specification as read off disk, before phase-1
/// preprocessing. Mirrors §3 `ActionConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub kind: ActionKind,
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub varfiles: Vec<PathBuf>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub spec: serde_yaml::Value,
    #[serde(skip)]
    pub internal: Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub kind: ActionKind,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Inline(serde_yaml::Value),
    LocalPath(String),
    Remote { repository: String, revision: String },
}

impl ActionConfig {
    /// Default timeout per kind, used when `timeout` is unset.
    pub fn default_timeout(&self) -> u64 {
        match self.kind {
            ActionKind::Build => 600,
            ActionKind::Deploy => 600,
            ActionKind::Run => 600,
            ActionKind::Test => 1200,
        }
    }

    pub fn effective_timeout(&self) -> u64 {
        self.timeout.unwrap_or_else(|| self.default_timeout())
    }

    /// `(kind, name)` uniqueness key.
    pub fn key(&self) -> (ActionKind, String) {
        (self.kind, self.name.clone())
    }

    /// §4.F file-inclusion-exclusion policy: `exclude: ["**/*"]` together
    /// with a non-empty `include` is invalid; `exclude: ["**/*"]` alone
    /// normalises `include` to empty (tracks nothing).
    pub fn validate_include_exclude(&self) -> Result<(), crate::error::ValidationError> {
        let excludes_everything = self.exclude.iter().any(|e| e == "**/*");
        if excludes_everything && !self.include.is_empty() {
            return Err(crate::error::ValidationError::InvalidIncludeExclude {
                kind: self.kind.to_string(),
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn normalised_include(&self) -> Vec<String> {
        let excludes_everything = self.exclude.iter().any(|e| e == "**/*");
        if excludes_everything {
            Vec::new()
        } else {
            self.include.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: ActionKind, include: Vec<&str>, exclude: Vec<&str>) -> ActionConfig {
        ActionConfig {
            kind,
            type_: "container".into(),
            name: "api".into(),
            dependencies: vec![],
            disabled: false,
            source: None,
            include: include.into_iter().map(String::from).collect(),
            exclude: exclude.into_iter().map(String::from).collect(),
            variables: BTreeMap::new(),
            varfiles: vec![],
            timeout: None,
            build: None,
            spec: serde_yaml::Value::Null,
            internal: Internal::default(),
        }
    }

    #[test]
    fn default_timeout_differs_by_kind() {
        assert_eq!(sample(ActionKind::Build, vec![], vec![]).default_timeout(), 600);
        assert_eq!(sample(ActionKind::Test, vec![], vec![]).default_timeout(), 1200);
    }

    #[test]
    fn exclude_everything_with_include_is_invalid() {
        let cfg = sample(ActionKind::Build, vec!["src/**"], vec!["**/*"]);
        assert!(cfg.validate_include_exclude().is_err());
    }

    #[test]
    fn exclude_everything_alone_normalises_include_to_empty() {
        let cfg = sample(ActionKind::Build, vec![], vec!["**/*"]);
        assert!(cfg.validate_include_exclude().is_ok());
        assert!(cfg.normalised_include().is_empty());
    }
}
