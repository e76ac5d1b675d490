//! Isolated package installation with atomic cache promotion
//!
//! Every unique dependency set installs into `root/<runtime>/<key>/`.
//! The install happens in a staging sibling which is renamed into
//! place only after the package manager succeeds and the install
//! manifest is written, so an addressable entry is always complete.
//! Losing the rename race to a concurrent install of the same set is
//! settled by reusing the winner's entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scriptgate_core::RuntimeKind;

use crate::error::{DepsError, DepsResult};
use crate::manifest::{discover_dependencies, Dependency, DependencySet};

/// File recording what an entry was installed from, written before the
/// entry is promoted
pub const MANIFEST_FILE: &str = ".deps_meta.json";

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// Cache manager configuration
#[derive(Debug, Clone)]
pub struct DepsCacheManagerConfig {
    /// Root of the hash-addressed cache tree
    pub root: PathBuf,

    /// Bound on one package-manager invocation
    pub install_timeout: Duration,
}

impl Default for DepsCacheManagerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".deps_cache"),
            install_timeout: Duration::from_secs(300),
        }
    }
}

/// A fully installed, addressable cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub runtime: RuntimeKind,
    pub path: PathBuf,
}

impl CacheEntry {
    /// Directory prepended to the runtime's module search path
    pub fn search_path(&self) -> PathBuf {
        match self.runtime {
            RuntimeKind::Python => self.path.clone(),
            RuntimeKind::Js => self.path.join("node_modules"),
        }
    }
}

/// Install audit record stored inside each entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallManifest {
    pub dependencies: Vec<Dependency>,
    pub installed_at: DateTime<Utc>,
    pub install_log: String,
}

/// Builds the package-manager command for a dependency set
///
/// One launch strategy per runtime; the cache manager owns everything
/// around the command (staging, timeout, promotion, cleanup).
pub trait PackageManager: Send + Sync {
    fn install_command(&self, set: &DependencySet, target: &Path) -> Command;
}

/// The real package managers: pip installing into `--target`, npm
/// installing under `--prefix`
#[derive(Debug, Default)]
pub struct SystemPackageManager;

impl PackageManager for SystemPackageManager {
    fn install_command(&self, set: &DependencySet, target: &Path) -> Command {
        match set.runtime {
            RuntimeKind::Python => {
                let mut cmd = Command::new(RuntimeKind::Python.interpreter());
                cmd.arg("-m").arg("pip").arg("install").arg("--target").arg(target);
                for dep in &set.entries {
                    cmd.arg(dep.spec());
                }
                cmd
            }
            RuntimeKind::Js => {
                // npm reads the dependency list from the package.json
                // the manager wrote into the target beforehand
                let mut cmd = Command::new("npm");
                cmd.arg("install").arg("--prefix").arg(target);
                cmd
            }
        }
    }
}

/// Hash-addressed dependency cache
pub struct DepsCacheManager {
    config: DepsCacheManagerConfig,
    package_manager: Box<dyn PackageManager>,
    /// Serializes installs of the identical set within this process;
    /// cross-process races settle on the rename
    install_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DepsCacheManager {
    pub fn new(config: DepsCacheManagerConfig) -> Self {
        Self::with_package_manager(config, Box::new(SystemPackageManager))
    }

    pub fn with_package_manager(
        config: DepsCacheManagerConfig,
        package_manager: Box<dyn PackageManager>,
    ) -> Self {
        Self {
            config,
            package_manager,
            install_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Directory an entry for this set lives at, installed or not
    pub fn entry_path(&self, runtime: RuntimeKind, key: &str) -> PathBuf {
        self.config.root.join(runtime.as_str()).join(key)
    }

    fn entry_for(&self, set: &DependencySet) -> CacheEntry {
        let key = set.cache_key();
        CacheEntry {
            path: self.entry_path(set.runtime, &key),
            runtime: set.runtime,
            key,
        }
    }

    /// An entry is reusable iff its directory exists; content
    /// verification is intentionally not performed
    pub fn is_valid(&self, entry: &CacheEntry) -> bool {
        entry.path.is_dir()
    }

    /// The already-installed environment for a script, if any
    ///
    /// Never installs. Discovery probes use this so import-time
    /// dependencies resolve exactly as they would during execution.
    pub async fn cached_environment(&self, script_path: &Path) -> DepsResult<Option<CacheEntry>> {
        let Some(set) = discover_dependencies(script_path).await? else {
            return Ok(None);
        };
        let entry = self.entry_for(&set);
        Ok(self.is_valid(&entry).then_some(entry))
    }

    /// The installed environment for a script, installing on demand
    ///
    /// `Ok(None)` means the script has no dependencies and runs
    /// against the ambient environment.
    pub async fn ensure_environment(
        &self,
        script_path: &Path,
        force: bool,
    ) -> DepsResult<Option<CacheEntry>> {
        let Some(set) = discover_dependencies(script_path).await? else {
            return Ok(None);
        };
        self.install_if_needed(&set, force).await.map(Some)
    }

    /// Install a dependency set unless a valid entry already exists
    pub async fn install_if_needed(&self, set: &DependencySet, force: bool) -> DepsResult<CacheEntry> {
        let entry = self.entry_for(set);

        // Identical sets racing to create the same directory must be
        // serialized; different keys proceed independently.
        let lock = self.lock_for(&entry.key).await;
        let _guard = lock.lock().await;

        if self.is_valid(&entry) {
            if !force {
                debug!(key = %entry.key, runtime = %entry.runtime, "reusing cache entry");
                return Ok(entry);
            }
            tokio::fs::remove_dir_all(&entry.path).await?;
        }

        self.install(set, &entry).await?;
        info!(key = %entry.key, runtime = %entry.runtime, count = set.entries.len(), "installed dependency set");
        Ok(entry)
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.install_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn install(&self, set: &DependencySet, entry: &CacheEntry) -> DepsResult<()> {
        let parent = entry
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.root.clone());
        tokio::fs::create_dir_all(&parent).await?;

        let staging = parent.join(format!(".tmp-{}-{}", entry.key, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&staging).await?;

        let outcome = self.run_install(set, entry, &staging).await;
        let install_log = match outcome {
            Ok(log) => log,
            Err(err) => {
                // Failure or timeout must not leave an addressable
                // half-installed directory behind.
                if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                    warn!(staging = %staging.display(), error = %cleanup, "failed to remove staging directory");
                }
                return Err(err);
            }
        };

        let manifest = InstallManifest {
            dependencies: set.entries.clone(),
            installed_at: Utc::now(),
            install_log,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        if let Err(err) = tokio::fs::write(staging.join(MANIFEST_FILE), manifest_bytes).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(err.into());
        }

        match tokio::fs::rename(&staging, &entry.path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Lost a cross-process race: someone promoted this key
                // first. Drop our staging and settle on their entry.
                let _ = tokio::fs::remove_dir_all(&staging).await;
                if self.is_valid(entry) {
                    debug!(key = %entry.key, "settled on concurrently installed entry");
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn run_install(
        &self,
        set: &DependencySet,
        entry: &CacheEntry,
        staging: &Path,
    ) -> DepsResult<String> {
        if set.runtime == RuntimeKind::Js {
            self.write_npm_manifest(set, staging).await?;
        }

        let mut cmd = self.package_manager.install_command(set, staging);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        debug!(program = %program, key = %entry.key, "running package manager");

        let child = cmd
            .spawn()
            .map_err(|e| DepsError::PackageManager(format!("{}: {}", program, e)))?;

        match tokio::time::timeout(self.config.install_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !log.is_empty() {
                        log.push('\n');
                    }
                    log.push_str(&stderr);
                }
                if output.status.success() {
                    Ok(log)
                } else {
                    Err(DepsError::InstallFailed {
                        runtime: set.runtime,
                        key: entry.key.clone(),
                        log: log.trim().to_string(),
                    })
                }
            }
            Ok(Err(e)) => Err(e.into()),
            // Dropping the output future kills the package manager
            Err(_) => Err(DepsError::InstallTimeout {
                runtime: set.runtime,
                key: entry.key.clone(),
                seconds: self.config.install_timeout.as_secs(),
            }),
        }
    }

    async fn write_npm_manifest(&self, set: &DependencySet, staging: &Path) -> DepsResult<()> {
        let dependencies: std::collections::BTreeMap<&str, &str> = set
            .entries
            .iter()
            .map(|d| (d.name.as_str(), d.constraint.as_str()))
            .collect();
        let manifest = serde_json::json!({
            "name": "script-deps",
            "version": "1.0.0",
            "dependencies": dependencies,
        });
        tokio::fs::write(staging.join("package.json"), serde_json::to_vec_pretty(&manifest)?).await?;
        Ok(())
    }

    /// Install dependencies for many scripts, sequentially, collecting
    /// independent per-script outcomes
    pub async fn batch_install(&self, scripts: &[PathBuf]) -> BatchReport {
        let mut items = Vec::with_capacity(scripts.len());
        for script in scripts {
            let status = match discover_dependencies(script).await {
                Ok(None) => BatchItem {
                    script: script.clone(),
                    status: BatchStatus::NoDependencies,
                    detail: None,
                },
                Ok(Some(set)) => {
                    let already_valid = self.is_valid(&self.entry_for(&set));
                    match self.install_if_needed(&set, false).await {
                        Ok(entry) if already_valid => BatchItem {
                            script: script.clone(),
                            status: BatchStatus::Cached,
                            detail: Some(entry.key),
                        },
                        Ok(entry) => BatchItem {
                            script: script.clone(),
                            status: BatchStatus::Installed,
                            detail: Some(entry.key),
                        },
                        Err(err) => BatchItem {
                            script: script.clone(),
                            status: BatchStatus::Failed,
                            detail: Some(err.to_string()),
                        },
                    }
                }
                Err(err) => BatchItem {
                    script: script.clone(),
                    status: BatchStatus::Failed,
                    detail: Some(err.to_string()),
                },
            };
            items.push(status);
        }
        BatchReport { items }
    }
}

/// Per-script outcome of a batch install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Installed,
    Cached,
    NoDependencies,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub script: PathBuf,
    pub status: BatchStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn count(&self, status: BatchStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

/// Compose a child-process environment: the ambient environment with
/// the cache entry's search path prepended to the runtime's module
/// path variable
///
/// Pre-existing values are preserved behind the cache path, never
/// overwritten.
pub fn execution_environment(entry: Option<&CacheEntry>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    if let Some(entry) = entry {
        apply_search_path(&mut env, entry);
    }
    env
}

fn apply_search_path(env: &mut HashMap<String, String>, entry: &CacheEntry) {
    let var = entry.runtime.search_path_var();
    let search = entry.search_path().to_string_lossy().into_owned();
    let value = match env.get(var) {
        Some(existing) if !existing.is_empty() => {
            format!("{}{}{}", search, PATH_LIST_SEPARATOR, existing)
        }
        _ => search,
    };
    env.insert(var.to_string(), value);
}
