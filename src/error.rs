//! Crate-wide error taxonomy.
//!
//! Mirrors the error kind table from the engine design: each variant maps
//! to exactly one exit code and carries enough structure (source location,
//! cause) to render a useful diagnostic without re-parsing strings.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A location within a source YAML document, used by template and
/// validation errors so a reader can jump straight to the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(col)) => {
                write!(f, "{}:{}:{}", file.display(), line, col)
            }
            (Some(file), Some(line), None) => write!(f, "{}:{}", file.display(), line),
            (Some(file), None, None) => write!(f, "{}", file.display()),
            _ => write!(f, "<unknown location>"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unresolvable reference `{path}` at {location}")]
    UnresolvedReference { path: String, location: SourceLocation },
    #[error("syntax error in template expression at {location}: {message}")]
    Syntax { message: String, location: SourceLocation },
    #[error("helper `{name}` expected {expected} argument(s), got {got}")]
    Arity { name: String, expected: usize, got: usize },
    #[error("helper `{name}` received an argument of the wrong type: {message}")]
    WrongType { name: String, message: String },
    #[error("cyclic variable reference detected through `{path}`")]
    Cycle { path: String },
    #[error("reserved key `${key}` used outside a recognised structural operator")]
    ReservedKey { key: String },
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{file}: {message}")]
    Schema { file: PathBuf, message: String },
    #[error("found two enabled actions of the same kind and name: {kind}.{name}")]
    DuplicateAction { kind: String, name: String },
    #[error("`exclude` contains `**/*` together with a non-empty `include` in {kind}.{name}")]
    InvalidIncludeExclude { kind: String, name: String },
    #[error("dependency cycle detected: {participants}")]
    Cycle { participants: String },
    #[error("unknown key `${key}` (did you mean `${suggestion}`?)", )]
    UnknownReservedKey { key: String, suggestion: String },
}

impl From<crate::types::ActionNameError> for ValidationError {
    fn from(e: crate::types::ActionNameError) -> Self {
        ValidationError::Schema { file: PathBuf::new(), message: e.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required field `{field}` in {kind}.{name}")]
    MissingField { kind: String, name: String, field: String },
    #[error("unknown plugin action type `{type_}` for kind {kind}")]
    UnknownActionType { kind: String, type_: String },
    #[error("dependency target `{kind}.{name}` does not exist in the graph")]
    MissingDependencyTarget { kind: String, name: String },
    #[error("plugin `{plugin}` attempted to mutate action `{kind}.{name}` introduced by another plugin's augmentGraph step")]
    ForeignAugmentation { plugin: String, kind: String, name: String },
    #[error("plugin `{plugin}`'s augmentGraph handler returned an invalid action: {message}")]
    InvalidAugmentation { plugin: String, message: String },
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
    pub handler: String,
}

#[derive(Error, Debug)]
#[error("transient error in handler `{handler}` (attempt {attempt}): {message}")]
pub struct TransientError {
    pub message: String,
    pub handler: String,
    pub attempt: u32,
}

#[derive(Error, Debug)]
#[error("task `{kind}.{name}` exceeded its {timeout_secs}s timeout")]
pub struct TimeoutError {
    pub kind: String,
    pub name: String,
    pub timeout_secs: u64,
}

#[derive(Error, Debug)]
#[error("cancelled")]
pub struct CancellationError;

/// Top-level error type returned by every fallible public operation.
#[derive(Error, Debug)]
pub enum GardenError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Cancellation(#[from] CancellationError),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Maps an error to a process exit code per the engine's external-interface
/// contract: 0 success, 1 runtime failure, 2 configuration error, 3 cancelled.
pub trait ExitCode {
    fn exit_code(&self) -> i32;
}

impl ExitCode for GardenError {
    fn exit_code(&self) -> i32 {
        match self {
            GardenError::Validation(_) | GardenError::Configuration(_) => 2,
            GardenError::Cancellation(_) => 3,
            _ => 1,
        }
    }
}

/// Attaches an actionable "fix it" hint to an error, independent of its
/// `Display` message. Kept as a separate trait (rather than folded into
/// `Display`) so renderers can choose whether to show the hint.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<String>;
}

impl FixSuggestion for GardenError {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            GardenError::Template(TemplateError::UnresolvedReference { path, .. }) => Some(
                format!("check that `{path}` is spelled correctly and that the referenced action is an explicit or implicit dependency"),
            ),
            GardenError::Template(TemplateError::Arity { name, expected, .. }) => {
                Some(format!("`{name}` takes {expected} argument(s); check the call site"))
            }
            GardenError::Validation(ValidationError::DuplicateAction { kind, name }) => Some(
                format!("disable or rename one of the two `{kind}.{name}` actions"),
            ),
            GardenError::Validation(ValidationError::Cycle { participants }) => Some(format!(
                "break the cycle by removing one dependency among: {participants}"
            )),
            GardenError::Configuration(ConfigurationError::MissingDependencyTarget { kind, name }) => {
                Some(format!("define an action named `{name}` of kind `{kind}`, or remove the dependency"))
            }
            GardenError::Configuration(ConfigurationError::ForeignAugmentation { plugin, kind, name }) => Some(format!(
                "plugin `{plugin}` tried to add `{kind}.{name}`, which already exists; have it contribute under a different name"
            )),
            GardenError::Timeout(_) => Some("increase the action's `timeout` or investigate why the handler is slow".into()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GardenError>;
