//! Walks a project root, parses `---`-separated YAML documents, and
//! attaches source metadata. Grounded on the same `walkdir` + `glob`
//! directory-traversal idiom used throughout this codebase for scanning a
//! tree of files.

use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use super::DocumentKind;
use crate::error::{GardenError, ValidationError};

/// A YAML document as read off disk, not yet dispatched to a typed
/// config struct. `kind` is `None` when the document's `kind` field isn't
/// one the loader recognises; the raw text survives as `kind_raw` so the
/// validator can offer a "did you mean" suggestion instead of the loader
/// failing the whole scan outright.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub kind: Option<DocumentKind>,
    pub kind_raw: String,
    pub name: Option<String>,
    pub path: PathBuf,
    pub raw: serde_yaml::Value,
}

const DEFAULT_DOT_IGNORE: &[&str] = &[".git", ".garden", "node_modules"];

/// Loads every `*.garden.yml`/`*.garden.yaml` document under `root`,
/// honouring `scan_include`/`scan_exclude` globs (relative to `root`) and
/// a fixed set of always-ignored directories.
pub fn load_project(
    root: &Path,
    scan_include: &[String],
    scan_exclude: &[String],
) -> Result<Vec<RawDocument>, GardenError> {
    let include_patterns = compile_patterns(scan_include);
    let exclude_patterns = compile_patterns(scan_exclude);

    let mut documents = Vec::new();
    let mut errors: Vec<ValidationError> = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_dot_ignored(e.path(), root)) {
        let entry = entry.map_err(|e| GardenError::Filesystem(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !(name.ends_with(".garden.yml") || name.ends_with(".garden.yaml")) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        if !include_patterns.is_empty() && !include_patterns.iter().any(|p| p.matches_path(rel)) {
            continue;
        }
        if exclude_patterns.iter().any(|p| p.matches_path(rel)) {
            continue;
        }

        let contents = std::fs::read_to_string(path)?;
        for de in serde_yaml::Deserializer::from_str(&contents) {
            let value = match serde_yaml::Value::deserialize(de) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(ValidationError::Schema { file: path.to_path_buf(), message: e.to_string() });
                    continue;
                }
            };
            if value.is_null() {
                continue;
            }
            match parse_document(&value, path) {
                Ok(doc) => documents.push(doc),
                Err(e) => errors.push(e),
            }
        }
    }

    if !errors.is_empty() {
        // Aggregate per-file failures into a single fatal error rather
        // than stopping at the first one, per the graph-build error
        // handling policy.
        let message = errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n");
        return Err(ValidationError::Schema { file: root.to_path_buf(), message }.into());
    }

    Ok(documents)
}

fn parse_document(value: &serde_yaml::Value, path: &Path) -> Result<RawDocument, ValidationError> {
    let kind_str = value
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| ValidationError::Schema { file: path.to_path_buf(), message: "document is missing required field `kind`".into() })?;
    let kind = parse_kind(kind_str);
    let name = value.get("name").and_then(|n| n.as_str()).map(String::from);
    Ok(RawDocument { kind, kind_raw: kind_str.to_string(), name, path: path.to_path_buf(), raw: value.clone() })
}

fn parse_kind(s: &str) -> Option<DocumentKind> {
    Some(match s {
        "Project" => DocumentKind::Project,
        "Command" => DocumentKind::Command,
        "Workflow" => DocumentKind::Workflow,
        "Module" => DocumentKind::Module,
        "Build" => DocumentKind::Build,
        "Deploy" => DocumentKind::Deploy,
        "Run" => DocumentKind::Run,
        "Test" => DocumentKind::Test,
        "Group" => DocumentKind::Group,
        "ConfigTemplate" => DocumentKind::ConfigTemplate,
        "RenderTemplate" => DocumentKind::RenderTemplate,
        _ => return None,
    })
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs.iter().filter_map(|g| Pattern::new(g).ok()).collect()
}

fn is_dot_ignored(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| DEFAULT_DOT_IGNORE.iter().any(|ignored| c.as_os_str() == *ignored))
}

use serde::Deserialize as _;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_multi_document_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.garden.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "kind: Build\nname: api\ntype: container\n---\nkind: Deploy\nname: api\ntype: container\n"
        )
        .unwrap();

        let docs = load_project(dir.path(), &[], &[]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].kind, Some(DocumentKind::Build));
        assert_eq!(docs[1].kind, Some(DocumentKind::Deploy));
    }

    #[test]
    fn unknown_kind_loads_with_none_rather_than_failing_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.garden.yml"), "kind: Buidl\nname: api\ntype: container\n").unwrap();
        let docs = load_project(dir.path(), &[], &[]).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind, None);
        assert_eq!(docs[0].kind_raw, "Buidl");
    }

    #[test]
    fn rejects_document_missing_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.garden.yml");
        std::fs::write(&path, "name: api\n").unwrap();
        assert!(load_project(dir.path(), &[], &[]).is_err());
    }

    #[test]
    fn ignores_dot_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".garden")).unwrap();
        std::fs::write(dir.path().join(".garden/cache.garden.yml"), "kind: Build\nname: x\ntype: container\n").unwrap();
        let docs = load_project(dir.path(), &[], &[]).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn scan_exclude_filters_matching_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
        std::fs::write(dir.path().join("vendor/skip.garden.yml"), "kind: Build\nname: skip\ntype: container\n").unwrap();
        std::fs::write(dir.path().join("keep.garden.yml"), "kind: Build\nname: keep\ntype: container\n").unwrap();
        let docs = load_project(dir.path(), &[], &["vendor/**".to_string()]).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name.as_deref(), Some("keep"));
    }
}
