//! Cache retention and usage reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

use scriptgate_core::RuntimeKind;

use crate::error::DepsResult;
use crate::installer::{DepsCacheManager, InstallManifest, MANIFEST_FILE};

/// Prefix marking a not-yet-promoted install directory
const STAGING_PREFIX: &str = ".tmp-";

/// Entry count and on-disk footprint for one runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeUsage {
    pub entries: usize,
    pub bytes: u64,
}

/// Cache-wide usage, broken down per runtime
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub python: RuntimeUsage,
    pub js: RuntimeUsage,
}

impl CacheStats {
    pub fn total_entries(&self) -> usize {
        self.python.entries + self.js.entries
    }

    pub fn total_bytes(&self) -> u64 {
        self.python.bytes + self.js.bytes
    }

    fn bucket_mut(&mut self, runtime: RuntimeKind) -> &mut RuntimeUsage {
        match runtime {
            RuntimeKind::Python => &mut self.python,
            RuntimeKind::Js => &mut self.js,
        }
    }
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub python_removed: usize,
    pub js_removed: usize,
    /// Orphaned staging directories swept up alongside expired entries
    pub removed_staging: usize,
    pub reclaimed_bytes: u64,
}

impl CleanupReport {
    pub fn removed_entries(&self) -> usize {
        self.python_removed + self.js_removed
    }
}

impl DepsCacheManager {
    /// Current entry counts and sizes; staging directories are not
    /// counted
    pub fn stats(&self) -> DepsResult<CacheStats> {
        let mut stats = CacheStats::default();
        for runtime in [RuntimeKind::Python, RuntimeKind::Js] {
            let runtime_dir = self.root().join(runtime.as_str());
            if !runtime_dir.is_dir() {
                continue;
            }
            for child in std::fs::read_dir(&runtime_dir)? {
                let child = child?;
                if !child.file_type()?.is_dir() || is_staging(&child.file_name()) {
                    continue;
                }
                let bucket = stats.bucket_mut(runtime);
                bucket.entries += 1;
                bucket.bytes += dir_size(&child.path());
            }
        }
        Ok(stats)
    }

    /// Remove entries installed more than `max_age` ago, plus staging
    /// directories left behind by crashed installs
    ///
    /// Entry age comes from the install manifest, falling back to the
    /// directory's modification time when the manifest is unreadable.
    pub fn evict_older_than(&self, max_age: Duration) -> DepsResult<CleanupReport> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = CleanupReport::default();

        for runtime in [RuntimeKind::Python, RuntimeKind::Js] {
            let runtime_dir = self.root().join(runtime.as_str());
            if !runtime_dir.is_dir() {
                continue;
            }
            for child in std::fs::read_dir(&runtime_dir)? {
                let child = child?;
                let path = child.path();
                if !child.file_type()?.is_dir() {
                    continue;
                }
                let Some(stamp) = entry_timestamp(&path) else {
                    continue;
                };
                if stamp >= cutoff {
                    continue;
                }

                let staging = is_staging(&child.file_name());
                let bytes = dir_size(&path);
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), staging, "evicted cache directory");
                        report.reclaimed_bytes += bytes;
                        if staging {
                            report.removed_staging += 1;
                        } else {
                            match runtime {
                                RuntimeKind::Python => report.python_removed += 1,
                                RuntimeKind::Js => report.js_removed += 1,
                            }
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "failed to evict cache directory");
                    }
                }
            }
        }
        Ok(report)
    }
}

fn is_staging(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with(STAGING_PREFIX)
}

fn entry_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let manifest_path = path.join(MANIFEST_FILE);
    if let Ok(text) = std::fs::read_to_string(&manifest_path) {
        if let Ok(manifest) = serde_json::from_str::<InstallManifest>(&text) {
            return Some(manifest.installed_at);
        }
    }
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}
