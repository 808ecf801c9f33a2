//! Validated newtypes shared across the engine.
//!
//! Follows the same pattern the rest of the codebase uses for identifiers:
//! validate once at construction, then move the value around as a cheap,
//! already-trusted type instead of re-validating a bare `String` at every
//! call site.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four action kinds the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ActionKind {
    Build,
    Deploy,
    Run,
    Test,
}

impl ActionKind {
    /// Scheduling priority used by the Solver's ready queue: lower sorts
    /// first. Build surfaces before Run/Test, which surface before Deploy.
    pub fn priority(self) -> u8 {
        match self {
            ActionKind::Build => 0,
            ActionKind::Run | ActionKind::Test => 1,
            ActionKind::Deploy => 2,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Build => "Build",
            ActionKind::Deploy => "Deploy",
            ActionKind::Run => "Run",
            ActionKind::Test => "Test",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ActionKind {
    type Err = ActionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Build" => Ok(ActionKind::Build),
            "Deploy" => Ok(ActionKind::Deploy),
            "Run" => Ok(ActionKind::Run),
            "Test" => Ok(ActionKind::Test),
            other => Err(ActionKindError::Unknown(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActionKindError {
    #[error("unknown action kind `{0}` (expected one of Build, Deploy, Run, Test)")]
    Unknown(String),
}

const MAX_NAME_LENGTH: usize = 128;

/// A validated action name: non-empty, at most 128 bytes, alphanumeric
/// plus `-`/`_`/`.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionName(Arc<str>);

#[derive(Error, Debug)]
pub enum ActionNameError {
    #[error("action name must not be empty")]
    Empty,
    #[error("action name `{0}` exceeds {MAX_NAME_LENGTH} characters")]
    TooLong(String),
    #[error("action name `{0}` contains a character other than alphanumerics, `-`, `_`, `.`")]
    InvalidCharacter(String),
}

impl ActionName {
    pub fn new(s: impl Into<String>) -> Result<Self, ActionNameError> {
        let s = s.into();
        if s.is_empty() {
            return Err(ActionNameError::Empty);
        }
        if s.len() > MAX_NAME_LENGTH {
            return Err(ActionNameError::TooLong(s));
        }
        if !s.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(ActionNameError::InvalidCharacter(s));
        }
        Ok(ActionName(Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for ActionName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActionName {
    type Error = ActionNameError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ActionName::new(value)
    }
}

impl From<ActionName> for String {
    fn from(value: ActionName) -> Self {
        value.0.to_string()
    }
}

/// A `(kind, name)` pair: the engine's primary key for actions everywhere
/// from the config graph to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionRef {
    pub kind: ActionKind,
    pub name: ActionName,
}

impl ActionRef {
    pub fn new(kind: ActionKind, name: ActionName) -> Self {
        ActionRef { kind, name }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Execution variant selected per action for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Default,
    Sync,
    Local,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Default => "default",
            Mode::Sync => "sync",
            Mode::Local => "local",
        };
        write!(f, "{s}")
    }
}

/// Content-addressed action identifier, always prefixed `v-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(Arc<str>);

impl Version {
    pub fn from_hex_digest(digest: &str) -> Self {
        Version(Arc::from(format!("v-{}", &digest[..digest.len().min(16)])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(kind, name, version, mode)` — the key under which task results and
/// the on-disk cache are addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ActionKind,
    pub name: ActionName,
    pub version: Version,
    pub mode: Mode,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}:{}", self.kind, self.name, self.version, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_priority_orders_build_before_deploy() {
        assert!(ActionKind::Build.priority() < ActionKind::Run.priority());
        assert!(ActionKind::Run.priority() < ActionKind::Deploy.priority());
        assert_eq!(ActionKind::Run.priority(), ActionKind::Test.priority());
    }

    #[test]
    fn action_name_rejects_empty_and_oversized() {
        assert!(matches!(ActionName::new(""), Err(ActionNameError::Empty)));
        let long = "a".repeat(200);
        assert!(matches!(ActionName::new(long), Err(ActionNameError::TooLong(_))));
    }

    #[test]
    fn action_name_rejects_invalid_characters() {
        assert!(matches!(
            ActionName::new("foo bar"),
            Err(ActionNameError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn action_ref_display() {
        let r = ActionRef::new(ActionKind::Build, ActionName::new("api").unwrap());
        assert_eq!(r.to_string(), "Build.api");
    }

    #[test]
    fn cache_key_display_includes_mode() {
        let key = CacheKey {
            kind: ActionKind::Deploy,
            name: ActionName::new("api").unwrap(),
            version: Version::from_hex_digest("abcdef0123456789ff"),
            mode: Mode::Sync,
        };
        assert_eq!(key.to_string(), "Deploy.api@v-abcdef0123456789:sync");
    }
}
