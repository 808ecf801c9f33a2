//! Plugin tool download/cache/checksum verification.
//!
//! Tools live under `~/.garden/tools/<plugin>/<tool>/<version>/<platform>-
//! <arch>/`. Concurrent requests for the same tool are serialised via an
//! in-process named lock, matching the codebase's existing pattern of
//! guarding a single shared external resource behind a keyed mutex.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{GardenError, PluginError};

/// A plugin-declared external binary: name, version, per-platform URL and
/// checksum, optional extraction rules.
#[derive(Debug, Clone)]
pub struct PluginTool {
    pub plugin: String,
    pub name: String,
    pub version: String,
    pub platform_urls: HashMap<String, PlatformArtifact>,
}

#[derive(Debug, Clone)]
pub struct PlatformArtifact {
    pub url: String,
    pub sha256: String,
}

impl PluginTool {
    pub fn cache_dir(&self, root: &std::path::Path, platform_arch: &str) -> PathBuf {
        root.join(&self.plugin).join(&self.name).join(&self.version).join(platform_arch)
    }
}

/// Per-user tool cache with a download lock keyed by `(plugin, tool,
/// version, platform)` so two concurrent requests for the same artifact
/// wait for the first instead of downloading twice.
pub struct ToolCache {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ToolCache {
    pub fn new() -> Self {
        let root = dirs_home().join(".garden").join("tools");
        ToolCache { root, locks: DashMap::new() }
    }

    pub fn with_root(root: PathBuf) -> Self {
        ToolCache { root, locks: DashMap::new() }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Returns the cached artifact path, downloading and verifying it
    /// first if absent. `fetch` performs the actual byte transfer — kept
    /// generic so tests can substitute an in-memory fetcher instead of
    /// making a real network call.
    pub async fn ensure<F, Fut>(&self, tool: &PluginTool, platform_arch: &str, fetch: F) -> Result<PathBuf, GardenError>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, PluginError>>,
    {
        let artifact = tool
            .platform_urls
            .get(platform_arch)
            .ok_or_else(|| PluginError { message: format!("no artifact for platform `{platform_arch}`"), handler: "tools.ensure".into() })?;

        let key = format!("{}:{}:{}:{}", tool.plugin, tool.name, tool.version, platform_arch);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let dir = tool.cache_dir(&self.root, platform_arch);
        let manifest_path = dir.join("manifest.json");
        if manifest_path.exists() {
            return Ok(dir);
        }

        let bytes = fetch(artifact.url.clone()).await?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        if digest != artifact.sha256 {
            return Err(PluginError {
                message: format!("checksum mismatch for {}: expected {}, got {digest}", tool.name, artifact.sha256),
                handler: "tools.ensure".into(),
            }
            .into());
        }

        std::fs::create_dir_all(&dir)?;
        let binary_path = dir.join(&tool.name);
        std::fs::write(&binary_path, &bytes)?;
        let tmp_manifest = dir.join("manifest.json.tmp");
        std::fs::write(&tmp_manifest, format!(r#"{{"url":"{}","sha256":"{}"}}"#, artifact.url, digest))?;
        std::fs::rename(&tmp_manifest, &manifest_path)?; // atomic publish

        Ok(dir)
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new()
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool(root: &std::path::Path) -> (PluginTool, String) {
        let bytes = b"fake-binary-contents".to_vec();
        let sha = format!("{:x}", Sha256::digest(&bytes));
        let mut platforms = HashMap::new();
        platforms.insert("linux-x64".to_string(), PlatformArtifact { url: "https://example.invalid/tool".into(), sha256: sha });
        let _ = root;
        (PluginTool { plugin: "terraform".into(), name: "terraform".into(), version: "1.7.0".into(), platform_urls: platforms }, String::from_utf8(bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn downloads_and_caches_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ToolCache::with_root(dir.path().to_path_buf());
        let (tool, _) = sample_tool(dir.path());
        let path = cache
            .ensure(&tool, "linux-x64", |_url| async { Ok(b"fake-binary-contents".to_vec()) })
            .await
            .unwrap();
        assert!(path.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn rejects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ToolCache::with_root(dir.path().to_path_buf());
        let (tool, _) = sample_tool(dir.path());
        let result = cache.ensure(&tool, "linux-x64", |_url| async { Ok(b"tampered".to_vec()) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn second_call_hits_cache_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ToolCache::with_root(dir.path().to_path_buf());
        let (tool, _) = sample_tool(dir.path());
        cache.ensure(&tool, "linux-x64", |_url| async { Ok(b"fake-binary-contents".to_vec()) }).await.unwrap();
        let result = cache.ensure(&tool, "linux-x64", |_url| async { panic!("should not fetch again") }).await;
        assert!(result.is_ok());
    }
}
