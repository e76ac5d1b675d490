//! Filesystem scan and catalog synchronization

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use scriptgate_core::{LoadState, RuntimeKind, Schema, ScriptRecord};
use scriptgate_deps::{execution_environment, DepsCacheManager};
use scriptgate_interfaces::CatalogStore;

use crate::discovery::{clip_chars, SchemaProbe};
use crate::error::RegistryResult;

/// Scan behavior knobs
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Directories walked for scripts
    pub roots: Vec<PathBuf>,

    /// Glob-style name patterns pruned from the walk
    pub ignore_patterns: Vec<String>,

    /// Bound on one schema probe
    pub discovery_timeout: Duration,

    /// Write the discovered schema next to the script as
    /// `{stem}._map.json`
    pub write_sidecar: bool,

    /// Bound on the diagnostic text stored for a failed discovery
    pub diagnostic_preview_chars: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("scripts")],
            ignore_patterns: vec![
                "node_modules".to_string(),
                "__pycache__".to_string(),
                ".git".to_string(),
                ".venv".to_string(),
                "*.pyc".to_string(),
                ".*".to_string(),
            ],
            discovery_timeout: Duration::from_secs(30),
            write_sidecar: true,
            diagnostic_preview_chars: 500,
        }
    }
}

/// Counters from one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Executable scripts considered
    pub scanned: usize,
    /// Schemas discovered and recorded this pass
    pub loaded: usize,
    /// Discovery attempts that failed this pass
    pub failed: usize,
    /// Scripts skipped because their content was unchanged
    pub unchanged: usize,
}

/// Walks the script roots and keeps the catalog in sync
///
/// Records are only ever created or updated here; nothing removes a
/// record for a file that disappeared.
pub struct ScriptScanner {
    config: ScannerConfig,
    catalog: Arc<dyn CatalogStore>,
    deps: Arc<DepsCacheManager>,
    probe: Arc<dyn SchemaProbe>,
    ignore: IgnoreMatcher,
}

impl ScriptScanner {
    pub fn new(
        config: ScannerConfig,
        catalog: Arc<dyn CatalogStore>,
        deps: Arc<DepsCacheManager>,
        probe: Arc<dyn SchemaProbe>,
    ) -> Self {
        let ignore = IgnoreMatcher::new(&config.ignore_patterns);
        Self {
            config,
            catalog,
            deps,
            probe,
            ignore,
        }
    }

    /// One full pass over every configured root
    ///
    /// Only catalog faults abort the pass; everything that can go
    /// wrong with a single script is recorded on that script's record.
    pub async fn scan_once(&self) -> RegistryResult<ScanReport> {
        let mut report = ScanReport::default();

        for root in &self.config.roots {
            if !root.is_dir() {
                debug!(root = %root.display(), "script root does not exist, skipping");
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !self.ignore.matches_name(e.file_name()));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(root = %root.display(), error = %err, "walk error during scan");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(runtime) = RuntimeKind::from_path(entry.path()) else {
                    continue;
                };
                self.process_script(root, entry.path(), runtime, &mut report)
                    .await?;
            }
        }

        info!(
            scanned = report.scanned,
            loaded = report.loaded,
            failed = report.failed,
            unchanged = report.unchanged,
            "scan pass complete"
        );
        Ok(report)
    }

    async fn process_script(
        &self,
        root: &Path,
        path: &Path,
        runtime: RuntimeKind,
        report: &mut ScanReport,
    ) -> RegistryResult<()> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable script, skipping");
                return Ok(());
            }
        };
        if !runtime.has_entrypoint(&String::from_utf8_lossy(&bytes)) {
            return Ok(());
        }
        report.scanned += 1;

        let content_hash = format!("{:x}", Sha256::digest(&bytes));
        let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        let existing = self.catalog.get_by_path(&rel).await?;
        if let Some(existing) = &existing {
            // An unchanged file keeps its previous discovery outcome;
            // only a Pending record is probed again.
            if existing.content_hash == content_hash && existing.load_state != LoadState::Pending {
                report.unchanged += 1;
                return Ok(());
            }
        }

        let mut record = match existing {
            Some(mut record) => {
                record.content_hash = content_hash;
                record
            }
            None => ScriptRecord::new(rel, runtime, content_hash),
        };

        match self.discover_schema(path, runtime).await {
            Ok(schema) => {
                if self.config.write_sidecar {
                    self.write_sidecar(path, &schema).await;
                }
                debug!(script = %record.name, params = schema.len(), "schema discovered");
                record.mark_loaded(schema);
                report.loaded += 1;
            }
            Err(diagnostic) => {
                warn!(script = %record.name, %diagnostic, "schema discovery failed");
                record.mark_failed(diagnostic);
                report.failed += 1;
            }
        }
        self.catalog.upsert(record).await?;
        Ok(())
    }

    async fn discover_schema(&self, path: &Path, runtime: RuntimeKind) -> Result<Schema, String> {
        // Same environment a real execution would see, but discovery
        // never triggers an install of its own.
        let env = match self.deps.cached_environment(path).await {
            Ok(entry) => execution_environment(entry.as_ref()),
            Err(err) => return Err(self.clip_diagnostic(format!("dependency lookup failed: {err}"))),
        };
        self.probe
            .discover(path, runtime, &env, self.config.discovery_timeout)
            .await
            .map_err(|failure| self.clip_diagnostic(failure.to_string()))
    }

    fn clip_diagnostic(&self, diagnostic: String) -> String {
        clip_chars(&diagnostic, self.config.diagnostic_preview_chars)
    }

    /// Persist the schema next to the script; failure to write it
    /// never fails the scan
    async fn write_sidecar(&self, script: &Path, schema: &Schema) {
        let stem = match script.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => return,
        };
        let sidecar = script.with_file_name(format!("{stem}._map.json"));
        match serde_json::to_vec_pretty(schema) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&sidecar, bytes).await {
                    warn!(sidecar = %sidecar.display(), error = %err, "failed to write schema sidecar");
                }
            }
            Err(err) => {
                warn!(sidecar = %sidecar.display(), error = %err, "failed to serialize schema sidecar");
            }
        }
    }
}

/// Precompiled ignore patterns; names that fail glob compilation fall
/// back to substring matching
struct IgnoreMatcher {
    globs: Vec<glob::Pattern>,
    literals: Vec<String>,
}

impl IgnoreMatcher {
    fn new(patterns: &[String]) -> Self {
        let mut globs = Vec::new();
        let mut literals = Vec::new();
        for pattern in patterns {
            match glob::Pattern::new(pattern) {
                Ok(glob) => globs.push(glob),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "invalid ignore pattern, matching as substring");
                    literals.push(pattern.clone());
                }
            }
        }
        Self { globs, literals }
    }

    fn matches_name(&self, name: &std::ffi::OsStr) -> bool {
        let name = name.to_string_lossy();
        self.globs.iter().any(|glob| glob.matches(&name))
            || self.literals.iter().any(|literal| name.contains(literal.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryFailure;
    use async_trait::async_trait;
    use scriptgate_core::parse_schema;
    use scriptgate_deps::DepsCacheManagerConfig;
    use scriptgate_interfaces::InMemoryCatalog;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PY_MAIN: &str = "import sys\n\nif __name__ == \"__main__\":\n    print(\"ok\")\n";

    struct StubProbe {
        schema: Option<Schema>,
        calls: AtomicUsize,
    }

    impl StubProbe {
        fn loading(schema_json: &str) -> Arc<Self> {
            Arc::new(Self {
                schema: Some(parse_schema(schema_json).unwrap()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                schema: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SchemaProbe for StubProbe {
        async fn discover(
            &self,
            _script: &Path,
            _runtime: RuntimeKind,
            _env: &HashMap<String, String>,
            _timeout: Duration,
        ) -> Result<Schema, DiscoveryFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.schema {
                Some(schema) => Ok(schema.clone()),
                None => Err(DiscoveryFailure::BadExit {
                    code: 1,
                    stderr: "x".repeat(5000),
                }),
            }
        }
    }

    fn scanner_with(
        root: &Path,
        cache_root: &Path,
        catalog: Arc<InMemoryCatalog>,
        probe: Arc<StubProbe>,
        config: Option<ScannerConfig>,
    ) -> ScriptScanner {
        let config = config.unwrap_or_else(|| ScannerConfig {
            roots: vec![root.to_path_buf()],
            ..ScannerConfig::default()
        });
        let deps = Arc::new(DepsCacheManager::new(DepsCacheManagerConfig {
            root: cache_root.to_path_buf(),
            install_timeout: Duration::from_secs(30),
        }));
        ScriptScanner::new(config, catalog, deps, probe)
    }

    #[tokio::test]
    async fn scan_registers_only_executable_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("runnable.py"), PY_MAIN).unwrap();
        std::fs::write(root.join("library.py"), "def helper():\n    pass\n").unwrap();
        std::fs::write(root.join("notes.txt"), "not a script").unwrap();
        std::fs::write(root.join("handler.js"), "module.exports = main;\n").unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::loading(r#"{"n":{"flag":"--n","type":"int","required":true}}"#);
        let scanner = scanner_with(&root, dir.path(), catalog.clone(), probe.clone(), None);

        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.loaded, 2);

        let records = catalog.list().await.unwrap();
        let mut names: Vec<_> = records.iter().map(|r| r.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["handler", "runnable"]);
        for record in &records {
            assert!(record.load_state.is_loaded());
            assert_eq!(record.schema.len(), 1);
        }
    }

    #[tokio::test]
    async fn unchanged_content_skips_the_probe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("stable.py"), PY_MAIN).unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::loading(r#"{"n":{"flag":"--n","type":"int","required":true}}"#);
        let scanner = scanner_with(&root, dir.path(), catalog, probe.clone(), None);

        scanner.scan_once().await.unwrap();
        let second = scanner.scan_once().await.unwrap();

        assert_eq!(probe.calls(), 1);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.loaded, 0);
    }

    #[tokio::test]
    async fn changed_content_is_probed_again_with_identity_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(&root).unwrap();
        let script = root.join("evolving.py");
        std::fs::write(&script, PY_MAIN).unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::loading(r#"{"n":{"flag":"--n","type":"int","required":true}}"#);
        let scanner = scanner_with(&root, dir.path(), catalog.clone(), probe.clone(), None);

        scanner.scan_once().await.unwrap();
        let first = catalog.list().await.unwrap().pop().unwrap();

        std::fs::write(&script, format!("{PY_MAIN}# changed\n")).unwrap();
        scanner.scan_once().await.unwrap();
        let second = catalog.list().await.unwrap().pop().unwrap();

        assert_eq!(probe.calls(), 2);
        assert_eq!(first.id, second.id);
        assert_ne!(first.content_hash, second.content_hash);
    }

    #[tokio::test]
    async fn discovery_failure_is_contained_to_its_script() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("one.py"), PY_MAIN).unwrap();
        std::fs::write(root.join("two.py"), format!("{PY_MAIN}# other\n")).unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::failing();
        let scanner = scanner_with(&root, dir.path(), catalog.clone(), probe, None);

        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report.failed, 2);

        let records = catalog.list().await.unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            match &record.load_state {
                LoadState::Failed { diagnostic } => {
                    // Diagnostic stays within the configured preview bound
                    assert!(diagnostic.chars().count() <= 500);
                }
                other => panic!("expected failed state, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn ignore_patterns_prune_directories_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::fs::create_dir_all(root.join(".venv")).unwrap();
        std::fs::write(root.join("node_modules").join("dep.js"), "module.exports = 1;\n").unwrap();
        std::fs::write(root.join(".venv").join("shim.py"), PY_MAIN).unwrap();
        std::fs::write(root.join("kept.py"), PY_MAIN).unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::loading(r#"{"n":{"flag":"--n","type":"int","required":true}}"#);
        let scanner = scanner_with(&root, dir.path(), catalog.clone(), probe, None);

        scanner.scan_once().await.unwrap();
        let records = catalog.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "kept");
    }

    #[tokio::test]
    async fn sidecar_is_written_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("demo.py"), PY_MAIN).unwrap();

        let schema_json = r#"{"n":{"flag":"--n","type":"int","required":true}}"#;
        let catalog = Arc::new(InMemoryCatalog::new());
        let scanner = scanner_with(
            &root,
            dir.path(),
            catalog.clone(),
            StubProbe::loading(schema_json),
            None,
        );
        scanner.scan_once().await.unwrap();

        let sidecar = root.join("demo._map.json");
        let written: Schema =
            serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
        assert_eq!(written, parse_schema(schema_json).unwrap());

        // Fresh tree, sidecar disabled
        let dir2 = tempfile::tempdir().unwrap();
        let root2 = dir2.path().join("scripts");
        std::fs::create_dir_all(&root2).unwrap();
        std::fs::write(root2.join("demo.py"), PY_MAIN).unwrap();
        let config = ScannerConfig {
            roots: vec![root2.clone()],
            write_sidecar: false,
            ..ScannerConfig::default()
        };
        let scanner = scanner_with(
            &root2,
            dir2.path(),
            Arc::new(InMemoryCatalog::new()),
            StubProbe::loading(schema_json),
            Some(config),
        );
        scanner.scan_once().await.unwrap();
        assert!(!root2.join("demo._map.json").exists());
    }

    #[tokio::test]
    async fn missing_root_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(InMemoryCatalog::new());
        let probe = StubProbe::failing();
        let scanner = scanner_with(
            &dir.path().join("absent"),
            dir.path(),
            catalog,
            probe,
            None,
        );

        let report = scanner.scan_once().await.unwrap();
        assert_eq!(report, ScanReport::default());
    }
}
