//! Schema validation for loaded documents, using a typed shape descriptor
//! (nullable, default, enum, pattern) and per-file aggregated reporting,
//! in the style of the layered validator this codebase already ships for
//! its own document format.

use std::path::PathBuf;

use crate::config::{ActionConfig, RawDocument};
use crate::error::ValidationError;
use crate::types::{ActionKind, ActionName};
use crate::util::closest_match;

/// Aggregated validation outcome for one file.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub file_path: PathBuf,
    pub document_count: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_error(&mut self, err: ValidationError) {
        self.errors.push(err);
    }
}

const VALID_KINDS: &[&str] = &[
    "Project", "Command", "Workflow", "Module", "Build", "Deploy", "Run", "Test", "Group", "ConfigTemplate", "RenderTemplate",
];

pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Validator
    }

    /// Validates every document loaded from a single file, returning an
    /// aggregated result rather than failing on the first error.
    pub fn validate_documents(&self, file_path: PathBuf, docs: &[RawDocument]) -> ValidationResult {
        let mut result = ValidationResult { file_path, document_count: docs.len(), ..Default::default() };
        for doc in docs {
            if doc.kind.is_none() {
                result.add_error(self.unknown_kind_error(doc));
            }
            if doc.name.is_none() {
                result.add_error(ValidationError::Schema {
                    file: doc.path.clone(),
                    message: "document is missing required field `name`".into(),
                });
            }
        }
        result
    }

    fn unknown_kind_error(&self, doc: &RawDocument) -> ValidationError {
        let suggestion = closest_match(&doc.kind_raw, VALID_KINDS);
        ValidationError::Schema {
            file: doc.path.clone(),
            message: match suggestion {
                Some(s) => format!("unknown kind `{}` (did you mean `{s}`?)", doc.kind_raw),
                None => format!("unknown kind `{}`", doc.kind_raw),
            },
        }
    }

    /// Validates an already-deserialized `ActionConfig`'s framework-level
    /// invariants: identifier shape and the include/exclude policy. Plugin
    /// `spec` fields remain opaque here (validated by the plugin's own
    /// `validate` handler, once the action is resolved).
    pub fn validate_action_config(&self, action: &ActionConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Err(e) = ActionName::new(action.name.clone()) {
            errors.push(ValidationError::Schema {
                file: action.internal.config_file_path.clone(),
                message: format!("invalid action name `{}`: {e}", action.name),
            });
        }
        if let Err(e) = action.validate_include_exclude() {
            errors.push(e);
        }
        errors
    }

    /// `(kind, name)` uniqueness, honouring the "at most one enabled" rule:
    /// two actions sharing a key are fine if at most one is enabled; two
    /// enabled duplicates fail.
    pub fn detect_duplicate_actions(&self, actions: &[ActionConfig]) -> Vec<ValidationError> {
        use std::collections::HashMap;
        let mut by_key: HashMap<(ActionKind, String), Vec<&ActionConfig>> = HashMap::new();
        for a in actions {
            by_key.entry(a.key()).or_default().push(a);
        }
        let mut errors = Vec::new();
        for ((kind, name), group) in by_key {
            let enabled_count = group.iter().filter(|a| !a.disabled).count();
            if enabled_count > 1 {
                errors.push(ValidationError::DuplicateAction { kind: kind.to_string(), name });
            }
        }
        errors
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Internal;
    use std::collections::BTreeMap;

    fn action(kind: ActionKind, name: &str, disabled: bool) -> ActionConfig {
        ActionConfig {
            kind,
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
    fn detects_two_enabled_duplicates() {
        let actions = vec![action(ActionKind::Build, "foo", false), action(ActionKind::Build, "foo", false)];
        let errors = Validator::new().detect_duplicate_actions(&actions);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn allows_one_disabled_duplicate() {
        let actions = vec![action(ActionKind::Build, "foo", false), action(ActionKind::Build, "foo", true)];
        let errors = Validator::new().detect_duplicate_actions(&actions);
        assert!(errors.is_empty());
    }

    #[test]
    fn suggests_closest_kind_for_typo() {
        assert_eq!(closest_match("Buidl", VALID_KINDS), Some("Build"));
    }

    #[test]
    fn rejects_invalid_action_name() {
        let mut a = action(ActionKind::Build, "bad name!", false);
        a.internal.config_file_path = PathBuf::from("x.yml");
        let errors = Validator::new().validate_action_config(&a);
        assert!(!errors.is_empty());
    }
}
