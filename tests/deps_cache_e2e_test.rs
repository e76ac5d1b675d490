//! End-to-end test for the dependency cache
//!
//! This test validates the install protocol through the public API
//! with a counting package manager:
//! 1. Hash-addressed entries shared across scripts with the same set
//! 2. Zero installer invocations when a valid entry exists
//! 3. Failed installs leaving neither a valid entry nor staging debris
//! 4. Forced reinstalls and cache statistics
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scriptgate_deps::{
    DependencySet, DepsCacheManager, DepsCacheManagerConfig, DepsError, PackageManager,
};
use tokio::process::Command;

/// Package manager stand-in that counts invocations and runs a shell
/// snippet against the staging directory
struct CountingPackageManager {
    calls: Arc<AtomicUsize>,
    script: String,
}

impl PackageManager for CountingPackageManager {
    fn install_command(&self, _set: &DependencySet, target: &Path) -> Command {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(self.script.replace("{target}", &target.to_string_lossy()));
        cmd
    }
}

fn manager_with(
    root: &Path,
    script: &str,
    timeout: Duration,
) -> (DepsCacheManager, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = DepsCacheManager::with_package_manager(
        DepsCacheManagerConfig {
            root: root.join("deps_cache"),
            install_timeout: timeout,
        },
        Box::new(CountingPackageManager {
            calls: calls.clone(),
            script: script.to_string(),
        }),
    );
    (manager, calls)
}

/// A Python script plus a sibling requirements manifest
fn seed_script(dir: &Path, name: &str, requirements: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let script = dir.join(format!("{name}.py"));
    std::fs::write(&script, "print()\n").unwrap();
    std::fs::write(dir.join(format!("{name}_requirements.txt")), requirements).unwrap();
    script
}

fn staging_leftovers(cache_root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for runtime_dir in ["python", "js"] {
        let dir = cache_root.join(runtime_dir);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(".tmp-") {
                found.push(entry.path());
            }
        }
    }
    found
}

#[tokio::test]
async fn identical_sets_share_one_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, calls) = manager_with(
        dir.path(),
        "touch {target}/marker",
        Duration::from_secs(30),
    );

    // Same requirements, declared in different order
    let first = seed_script(&dir.path().join("a"), "etl", "requests==2.31.0\nflask>=3.0\n");
    let second = seed_script(&dir.path().join("b"), "report", "flask>=3.0\nrequests==2.31.0\n");

    let entry_a = manager
        .ensure_environment(&first, false)
        .await
        .unwrap()
        .expect("dependencies declared");
    let entry_b = manager
        .ensure_environment(&second, false)
        .await
        .unwrap()
        .expect("dependencies declared");

    assert_eq!(entry_a.path, entry_b.path);
    assert_eq!(entry_a.key, entry_b.key);
    assert!(entry_a.path.join("marker").is_file());
    // One install serves both scripts
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn valid_entry_short_circuits_reinstall() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, calls) = manager_with(
        dir.path(),
        "touch {target}/marker",
        Duration::from_secs(30),
    );
    let script = seed_script(dir.path(), "job", "pyyaml~=6.0\n");

    for _ in 0..3 {
        manager.ensure_environment(&script, false).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Force bypasses the valid entry
    manager.ensure_environment(&script, true).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_install_leaves_no_entry_and_no_staging() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, calls) = manager_with(
        dir.path(),
        "echo 'resolver exploded' >&2; exit 1",
        Duration::from_secs(30),
    );
    let script = seed_script(dir.path(), "job", "doomed==0.0.1\n");

    let err = manager.ensure_environment(&script, false).await.unwrap_err();
    match &err {
        DepsError::InstallFailed { log, .. } => assert!(log.contains("resolver exploded")),
        other => panic!("expected install failure, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing cached, nothing staged
    assert!(manager.cached_environment(&script).await.unwrap().is_none());
    assert!(staging_leftovers(&dir.path().join("deps_cache")).is_empty());

    // The next attempt installs again rather than trusting debris
    let (retry_manager, retry_calls) = manager_with(
        dir.path(),
        "touch {target}/marker",
        Duration::from_secs(30),
    );
    retry_manager
        .ensure_environment(&script, false)
        .await
        .unwrap();
    assert_eq!(retry_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hung_install_is_killed_after_the_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _calls) = manager_with(dir.path(), "sleep 30", Duration::from_millis(300));
    let script = seed_script(dir.path(), "job", "slowpkg==1.0\n");

    let started = std::time::Instant::now();
    let err = manager.ensure_environment(&script, false).await.unwrap_err();
    assert!(matches!(err, DepsError::InstallTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));

    assert!(manager.cached_environment(&script).await.unwrap().is_none());
    assert!(staging_leftovers(&dir.path().join("deps_cache")).is_empty());
}

#[tokio::test]
async fn stats_reflect_installed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _calls) = manager_with(
        dir.path(),
        "printf 'payload' > {target}/data.bin",
        Duration::from_secs(30),
    );

    seed_and_install(&manager, dir.path(), "one", "alpha==1\n").await;
    seed_and_install(&manager, dir.path(), "two", "beta==2\n").await;

    let stats = manager.stats().unwrap();
    assert_eq!(stats.python.entries, 2);
    assert_eq!(stats.js.entries, 0);
    assert!(stats.python.bytes > 0);
    assert_eq!(stats.total_entries(), 2);
}

async fn seed_and_install(manager: &DepsCacheManager, dir: &Path, name: &str, requirements: &str) {
    let script = seed_script(&dir.join(name), "job", requirements);
    manager.ensure_environment(&script, false).await.unwrap();
}
