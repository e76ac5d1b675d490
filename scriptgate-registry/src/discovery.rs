//! Schema discovery protocol
//!
//! A script invoked with [`SCHEMA_SENTINEL`] as its only argument must
//! print a single JSON object mapping parameter names to their specs
//! and exit 0, instead of running its normal logic. The probe runs the
//! script with the same working directory and environment a real
//! execution would get, so import-time dependencies resolve the same
//! way in both modes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use scriptgate_core::{parse_schema, RuntimeKind, Schema};

/// Reserved flag that switches a script into schema-reporting mode
pub const SCHEMA_SENTINEL: &str = "--_sys_get_schema";

/// Longest stderr slice carried in a probe failure
const STDERR_CLIP_CHARS: usize = 2000;

/// Longest stdout slice echoed back for malformed schemas
const PREVIEW_CLIP_CHARS: usize = 200;

/// Why one script's discovery attempt failed
#[derive(Debug, Error)]
pub enum DiscoveryFailure {
    #[error("schema probe exited with code {code}: {stderr}")]
    BadExit { code: i32, stderr: String },

    #[error("schema probe timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("schema probe printed an invalid schema ({reason}): {preview}")]
    InvalidSchema { reason: String, preview: String },

    #[error("failed to spawn schema probe: {0}")]
    Spawn(String),
}

/// The discovery request/response exchange with one script
#[async_trait]
pub trait SchemaProbe: Send + Sync {
    async fn discover(
        &self,
        script: &Path,
        runtime: RuntimeKind,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Schema, DiscoveryFailure>;
}

/// Runs the script under its runtime interpreter with the sentinel
/// flag appended
#[derive(Debug, Default)]
pub struct SubprocessProbe;

#[async_trait]
impl SchemaProbe for SubprocessProbe {
    async fn discover(
        &self,
        script: &Path,
        runtime: RuntimeKind,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Schema, DiscoveryFailure> {
        let working_dir = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut cmd = Command::new(runtime.interpreter());
        cmd.arg(script)
            .arg(SCHEMA_SENTINEL)
            .current_dir(working_dir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(script = %script.display(), runtime = %runtime, "probing script for schema");

        let child = cmd
            .spawn()
            .map_err(|e| DiscoveryFailure::Spawn(e.to_string()))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(DiscoveryFailure::Spawn(e.to_string())),
            // Dropping the output future kills the probe process
            Err(_) => {
                return Err(DiscoveryFailure::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryFailure::BadExit {
                code: output.status.code().unwrap_or(-1),
                stderr: clip_chars(stderr.trim(), STDERR_CLIP_CHARS),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| DiscoveryFailure::InvalidSchema {
            reason: "stdout is not UTF-8".to_string(),
            preview: String::new(),
        })?;

        parse_schema(stdout.trim()).map_err(|e| DiscoveryFailure::InvalidSchema {
            reason: e.to_string(),
            preview: clip_chars(stdout.trim(), PREVIEW_CLIP_CHARS),
        })
    }
}

/// Truncate on a character boundary
pub(crate) fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
