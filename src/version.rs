//! Version & Cache (4.J) — content-hash identity.
//!
//! An action's [`Version`] is a SHA-256 digest over everything that
//! changes its behaviour: kind, name, type, resolved spec, and resolved
//! variables. Two actions with identical digests are interchangeable from
//! the cache's point of view regardless of where their config came from.

use sha2::{Digest, Sha256};

use crate::config::ActionConfig;
use crate::types::Version;

pub fn compute_action_version(cfg: &ActionConfig) -> Version {
    let mut hasher = Sha256::new();
    hasher.update(cfg.kind.to_string().as_bytes());
    hasher.update(cfg.name.as_bytes());
    hasher.update(cfg.type_.as_bytes());
    if let Ok(spec_bytes) = serde_json::to_vec(&cfg.spec) {
        hasher.update(&spec_bytes);
    }
    if let Ok(var_bytes) = serde_json::to_vec(&cfg.variables) {
        hasher.update(&var_bytes);
    }
    Version::from_hex_digest(&format!("{:x}", hasher.finalize()))
}
