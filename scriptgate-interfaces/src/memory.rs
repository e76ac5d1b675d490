//! In-memory collaborator implementations
//!
//! Back the single-process CLI and the test suites. Production
//! deployments substitute persistent backends behind the same traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use scriptgate_core::{RunInvocation, ScriptId, ScriptRecord};

use crate::catalog::CatalogStore;
use crate::error::StoreError;
use crate::ledger::RunLedger;
use crate::services::{FileAccessChecker, MediaError, MediaResolver, Notifier};

/// Catalog store backed by a process-local map
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    records: Arc<RwLock<HashMap<ScriptId, ScriptRecord>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn get(&self, id: ScriptId) -> Result<Option<ScriptRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_path(&self, path: &Path) -> Result<Option<ScriptRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.path == path)
            .cloned())
    }

    async fn upsert(&self, record: ScriptRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScriptRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Run ledger backed by a process-local append vector
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    rows: Arc<RwLock<Vec<RunInvocation>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows ever appended
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl RunLedger for InMemoryLedger {
    async fn append(&self, invocation: RunInvocation) -> Result<(), StoreError> {
        self.rows.write().await.push(invocation);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunInvocation>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_for_script(
        &self,
        script_id: ScriptId,
        limit: usize,
    ) -> Result<Vec<RunInvocation>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .rev()
            .filter(|row| row.script_id == script_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Notifier that writes completions to the log
#[derive(Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, title: &str, body: &str) {
        info!(title = %title, "{}", body);
    }
}

/// Access checker confining scripts to a fixed set of directories
pub struct ScopedAccessChecker {
    roots: Vec<PathBuf>,
}

impl ScopedAccessChecker {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl FileAccessChecker for ScopedAccessChecker {
    fn is_allowed(&self, path: &Path) -> bool {
        // Canonicalize so `..` segments and symlinks cannot escape a root
        let Ok(resolved) = path.canonicalize() else {
            return false;
        };
        self.roots.iter().any(|root| {
            root.canonicalize()
                .map(|r| resolved.starts_with(&r))
                .unwrap_or(false)
        })
    }
}

/// Resolver for references that are already local paths
///
/// Remote URL fetching is a deployment concern and lives outside this
/// crate; the local resolver rejects anything that is not an existing
/// file.
pub struct LocalMediaResolver;

#[async_trait]
impl MediaResolver for LocalMediaResolver {
    async fn resolve(&self, reference: &str) -> Result<PathBuf, MediaError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Err(MediaError::Unresolvable {
                reference: reference.to_string(),
                reason: "remote fetch is not configured".to_string(),
            });
        }
        let path = PathBuf::from(reference);
        if !path.is_file() {
            return Err(MediaError::Unresolvable {
                reference: reference.to_string(),
                reason: "no such file".to_string(),
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_core::{InvocationId, RunStatus, RuntimeKind};

    fn record(path: &str) -> ScriptRecord {
        ScriptRecord::new(path, RuntimeKind::Python, "hash")
    }

    fn invocation(script_id: ScriptId, status: RunStatus) -> RunInvocation {
        let now = chrono::Utc::now();
        RunInvocation {
            id: InvocationId::new(),
            script_id,
            script_name: "s".into(),
            started_at: now,
            finished_at: now,
            duration_ms: 1,
            status,
            params: serde_json::json!({}),
            output_preview: None,
            error: None,
            artifact: None,
        }
    }

    #[tokio::test]
    async fn catalog_upsert_and_lookup() {
        let catalog = InMemoryCatalog::new();
        let rec = record("jobs/report.py");
        let id = rec.id;
        catalog.upsert(rec.clone()).await.unwrap();

        assert_eq!(catalog.get(id).await.unwrap(), Some(rec.clone()));
        assert_eq!(
            catalog.get_by_path(Path::new("jobs/report.py")).await.unwrap(),
            Some(rec)
        );
        assert!(catalog.get_by_path(Path::new("missing.py")).await.unwrap().is_none());
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn catalog_upsert_replaces_by_id() {
        let catalog = InMemoryCatalog::new();
        let mut rec = record("a.py");
        catalog.upsert(rec.clone()).await.unwrap();
        rec.content_hash = "other".into();
        catalog.upsert(rec.clone()).await.unwrap();

        let stored = catalog.get(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.content_hash, "other");
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_recent_is_newest_first() {
        let ledger = InMemoryLedger::new();
        let script = ScriptId::new();
        ledger.append(invocation(script, RunStatus::Success)).await.unwrap();
        ledger.append(invocation(script, RunStatus::Failure)).await.unwrap();
        ledger.append(invocation(ScriptId::new(), RunStatus::Timeout)).await.unwrap();

        let recent = ledger.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, RunStatus::Timeout);

        let for_script = ledger.recent_for_script(script, 10).await.unwrap();
        assert_eq!(for_script.len(), 2);
        assert_eq!(for_script[0].status, RunStatus::Failure);
    }

    #[test]
    fn scoped_checker_confines_to_roots() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("data.csv");
        std::fs::write(&inside, b"x").unwrap();

        let checker = ScopedAccessChecker::new(vec![dir.path().to_path_buf()]);
        assert!(checker.is_allowed(&inside));
        assert!(!checker.is_allowed(Path::new("/etc/hostname")));
        assert!(!checker.is_allowed(&dir.path().join("missing.csv")));
    }

    #[tokio::test]
    async fn local_resolver_accepts_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.bin");
        std::fs::write(&file, b"x").unwrap();

        let resolver = LocalMediaResolver;
        assert_eq!(resolver.resolve(file.to_str().unwrap()).await.unwrap(), file);
        assert!(resolver.resolve("https://example.com/f.bin").await.is_err());
        assert!(resolver
            .resolve(dir.path().join("gone.bin").to_str().unwrap())
            .await
            .is_err());
    }
}
