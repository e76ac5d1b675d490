//! Dependency manifest discovery and parsing
//!
//! Manifests are searched at fixed locations relative to the script:
//! a script-named variant, the shared file in the same directory, and
//! a script-named subdirectory. The first hit wins, so a script can
//! shadow a directory-wide manifest with its own.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use scriptgate_core::RuntimeKind;

use crate::error::{DepsError, DepsResult};

/// One `name<op>version` requirement line, operator included in the
/// constraint (`==1.2`, `>=2.0`); empty constraint for bare names
static REQUIREMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.\-]+)\s*([<>=!~]{1,2}=?.*)?$").expect("static regex"));

/// One declared package requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Version constraint with its operator, empty when unpinned
    pub constraint: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: constraint.into(),
        }
    }

    /// Installer spec string, e.g. `requests>=2.0`
    pub fn spec(&self) -> String {
        format!("{}{}", self.name, self.constraint)
    }
}

/// The resolved package requirements of one script under one runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySet {
    pub runtime: RuntimeKind,
    pub entries: Vec<Dependency>,
}

impl DependencySet {
    pub fn new(runtime: RuntimeKind, entries: Vec<Dependency>) -> Self {
        Self { runtime, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical digest of the set, used as the cache directory name
    ///
    /// Entries are sorted by package name and serialized
    /// deterministically before hashing, so element order never
    /// changes the key. Nothing else (script identity, timestamps,
    /// runtime) feeds the digest; the runtime only selects the parent
    /// directory of the entry.
    pub fn cache_key(&self) -> String {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.constraint.cmp(&b.constraint)));
        let canonical = serde_json::to_string(&sorted).expect("dependency list serializes");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}

/// Candidate manifest locations for a script, most specific first
fn manifest_candidates(script_path: &Path, runtime: RuntimeKind) -> Vec<PathBuf> {
    let dir = script_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = script_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let shared = match runtime {
        RuntimeKind::Python => "requirements.txt",
        RuntimeKind::Js => "package.json",
    };

    vec![
        dir.join(format!("{}_{}", stem, shared)),
        dir.join(shared),
        dir.join(&stem).join(shared),
    ]
}

/// Locate the manifest file for a script, if any exists
pub fn find_manifest(script_path: &Path, runtime: RuntimeKind) -> Option<PathBuf> {
    manifest_candidates(script_path, runtime)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Parse a line-oriented requirements manifest
///
/// Blank lines and `#` comments are skipped; lines that do not look
/// like a requirement are ignored rather than failing the whole file.
pub fn parse_requirements(text: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match REQUIREMENT_LINE.captures(line) {
            Some(caps) => {
                let name = caps[1].to_string();
                let constraint = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                deps.push(Dependency { name, constraint });
            }
            None => debug!(line, "skipping unrecognized requirement line"),
        }
    }
    deps
}

/// Parse a node-style manifest, merging `dependencies` and
/// `devDependencies`
pub fn parse_package_json(text: &str, path: &Path) -> DepsResult<Vec<Dependency>> {
    #[derive(Deserialize)]
    struct PackageManifest {
        #[serde(default)]
        dependencies: BTreeMap<String, String>,
        #[serde(default, rename = "devDependencies")]
        dev_dependencies: BTreeMap<String, String>,
    }

    let manifest: PackageManifest = serde_json::from_str(text).map_err(|e| DepsError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut merged = manifest.dependencies;
    merged.extend(manifest.dev_dependencies);

    Ok(merged
        .into_iter()
        .map(|(name, constraint)| Dependency { name, constraint })
        .collect())
}

/// Discover and parse a script's dependency set
///
/// `Ok(None)` means the script declares no dependencies, either
/// because no manifest exists or the manifest is empty.
pub async fn discover_dependencies(script_path: &Path) -> DepsResult<Option<DependencySet>> {
    let Some(runtime) = RuntimeKind::from_path(script_path) else {
        return Ok(None);
    };
    let Some(manifest_path) = find_manifest(script_path, runtime) else {
        return Ok(None);
    };

    let text = tokio::fs::read_to_string(&manifest_path).await?;
    let entries = match runtime {
        RuntimeKind::Python => parse_requirements(&text),
        RuntimeKind::Js => parse_package_json(&text, &manifest_path)?,
    };

    if entries.is_empty() {
        return Ok(None);
    }
    debug!(
        script = %script_path.display(),
        manifest = %manifest_path.display(),
        count = entries.len(),
        "discovered dependency set"
    );
    Ok(Some(DependencySet { runtime, entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requirement_lines() {
        let text = "\
# analysis stack
requests>=2.28
numpy==1.26.4

pyyaml~=6.0
plainpackage
";
        let deps = parse_requirements(text);
        assert_eq!(
            deps,
            vec![
                Dependency::new("requests", ">=2.28"),
                Dependency::new("numpy", "==1.26.4"),
                Dependency::new("pyyaml", "~=6.0"),
                Dependency::new("plainpackage", ""),
            ]
        );
        assert_eq!(deps[0].spec(), "requests>=2.28");
        assert_eq!(deps[3].spec(), "plainpackage");
    }

    #[test]
    fn ignores_lines_that_are_not_requirements() {
        let deps = parse_requirements("-r other.txt\ngood==1.0\nbad line here\n");
        assert_eq!(deps, vec![Dependency::new("good", "==1.0")]);
    }

    #[test]
    fn parses_package_json_and_merges_dev_dependencies() {
        let text = r#"{
            "name": "whatever",
            "dependencies": {"axios": "^1.6.0", "lodash": "4.17.21"},
            "devDependencies": {"lodash": "4.17.20", "jest": "^29.0.0"}
        }"#;
        let deps = parse_package_json(text, Path::new("package.json")).unwrap();
        // BTreeMap-backed, so sorted by name; devDependencies win ties
        assert_eq!(
            deps,
            vec![
                Dependency::new("axios", "^1.6.0"),
                Dependency::new("jest", "^29.0.0"),
                Dependency::new("lodash", "4.17.20"),
            ]
        );
    }

    #[test]
    fn rejects_malformed_package_json() {
        let result = parse_package_json("{not json", Path::new("package.json"));
        assert!(matches!(result, Err(DepsError::Manifest { .. })));
    }

    #[test]
    fn cache_key_ignores_element_order() {
        let a = DependencySet::new(
            RuntimeKind::Python,
            vec![Dependency::new("b", "==2"), Dependency::new("a", "==1")],
        );
        let b = DependencySet::new(
            RuntimeKind::Python,
            vec![Dependency::new("a", "==1"), Dependency::new("b", "==2")],
        );
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().len(), 16);
    }

    #[test]
    fn cache_key_changes_with_content() {
        let a = DependencySet::new(RuntimeKind::Python, vec![Dependency::new("a", "==1")]);
        let b = DependencySet::new(RuntimeKind::Python, vec![Dependency::new("a", "==2")]);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_is_runtime_independent() {
        // The runtime selects the parent directory, never the key
        let entries = vec![Dependency::new("left-pad", "^1.3.0")];
        let py = DependencySet::new(RuntimeKind::Python, entries.clone());
        let js = DependencySet::new(RuntimeKind::Js, entries);
        assert_eq!(py.cache_key(), js.cache_key());
    }

    #[test]
    fn manifest_lookup_prefers_script_named_variant() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("report.py");
        std::fs::write(&script, "print()").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "shared==1").unwrap();
        std::fs::write(dir.path().join("report_requirements.txt"), "specific==1").unwrap();

        let found = find_manifest(&script, RuntimeKind::Python).unwrap();
        assert_eq!(found, dir.path().join("report_requirements.txt"));
    }

    #[test]
    fn manifest_lookup_checks_script_named_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("etl.js");
        std::fs::write(&script, "x").unwrap();
        std::fs::create_dir(dir.path().join("etl")).unwrap();
        std::fs::write(dir.path().join("etl").join("package.json"), "{}").unwrap();

        let found = find_manifest(&script, RuntimeKind::Js).unwrap();
        assert_eq!(found, dir.path().join("etl").join("package.json"));
    }

    #[tokio::test]
    async fn discover_returns_none_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("lonely.py");
        std::fs::write(&script, "print()").unwrap();

        assert!(discover_dependencies(&script).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discover_returns_none_for_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.py");
        std::fs::write(&script, "print()").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "# only comments\n").unwrap();

        assert!(discover_dependencies(&script).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discover_parses_the_runtime_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.py");
        std::fs::write(&script, "print()").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests>=2.0\n").unwrap();

        let set = discover_dependencies(&script).await.unwrap().unwrap();
        assert_eq!(set.runtime, RuntimeKind::Python);
        assert_eq!(set.entries, vec![Dependency::new("requests", ">=2.0")]);
    }
}
