//! Config Store (4.K) — small persistent key/value stores used for
//! cached analytics opt-in, the local "is this the first run" flag, and
//! similar cross-invocation state, at both project and user scope.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::GardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Project,
    User,
}

pub struct ConfigStore {
    path: PathBuf,
    scope: StoreScope,
}

impl ConfigStore {
    pub fn project(project_root: &Path) -> Self {
        ConfigStore { path: project_root.join(".garden").join("config.yml"), scope: StoreScope::Project }
    }

    pub fn user(home: &Path) -> Self {
        ConfigStore { path: home.join(".garden").join("config.yml"), scope: StoreScope::User }
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    fn load(&self) -> Result<BTreeMap<String, Value>, GardenError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&raw).unwrap_or_default())
    }

    fn save(&self, data: &BTreeMap<String, Value>) -> Result<(), GardenError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("yml.tmp");
        std::fs::write(&tmp, serde_yaml::to_string(data)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, GardenError> {
        Ok(self.load()?.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), GardenError> {
        let mut data = self.load()?;
        data.insert(key.to_string(), value);
        self.save(&data)
    }

    pub fn delete(&self, key: &str) -> Result<(), GardenError> {
        let mut data = self.load()?;
        data.remove(key);
        self.save(&data)
    }

    /// One-time migration from the pre-YAML, flat `key=value` store this
    /// project used before: only runs if the new store doesn't exist yet
    /// and the legacy file does, and is a no-op otherwise.
    pub fn migrate_legacy(&self, legacy_path: &Path) -> Result<(), GardenError> {
        if self.path.exists() || !legacy_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(legacy_path)?;
        let mut data = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                data.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
            }
        }
        self.save(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::project(dir.path());
        store.set("analytics.enabled", Value::Bool(false)).unwrap();
        assert_eq!(store.get("analytics.enabled").unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::project(dir.path());
        store.set("foo", Value::String("bar".into())).unwrap();
        store.delete("foo").unwrap();
        assert_eq!(store.get("foo").unwrap(), None);
    }

    #[test]
    fn migrate_legacy_only_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.env");
        std::fs::write(&legacy, "analytics_id=abc123\n# comment\nempty_ignored\n").unwrap();
        let store = ConfigStore::project(dir.path());
        store.migrate_legacy(&legacy).unwrap();
        assert_eq!(store.get("analytics_id").unwrap(), Some(Value::String("abc123".into())));

        store.set("analytics_id", Value::String("overwritten".into())).unwrap();
        store.migrate_legacy(&legacy).unwrap(); // new store already exists, must not clobber
        assert_eq!(store.get("analytics_id").unwrap(), Some(Value::String("overwritten".into())));
    }
}
