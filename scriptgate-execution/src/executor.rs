//! Process execution, timeout enforcement, and output classification
//!
//! Every attempt moves Spawned → Exited | TimedOut | Cancelled, is
//! classified exactly once, and appends exactly one row to the run
//! ledger. Timeouts and cancellations kill the child forcibly; there
//! are no retries.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use scriptgate_core::{InvocationId, RunInvocation, RunStatus, RuntimeKind, ScriptRecord};
use scriptgate_interfaces::{Notifier, RunLedger};

use crate::artifacts::ArtifactStore;
use crate::error::ExecutionError;
use crate::registry::{RunningJob, RunningRegistry};

#[derive(Debug, Clone)]
pub struct ProcessExecutorConfig {
    /// Wall-clock bound on one run, unless the request overrides it
    pub timeout: Duration,

    /// How long a killed child gets to actually exit
    pub termination_grace: Duration,

    /// Bound on the stored preview of structured stdout
    pub stdout_preview_chars: usize,

    /// Bound on stored failure diagnostics
    pub diagnostic_preview_chars: usize,
}

impl Default for ProcessExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            termination_grace: Duration::from_secs(5),
            stdout_preview_chars: 1000,
            diagnostic_preview_chars: 500,
        }
    }
}

/// A fully composed child-process invocation
#[derive(Debug, Clone)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
}

impl CommandLine {
    /// `[interpreter, script path] + marshaled args`, running in the
    /// script's own directory
    pub fn for_script(
        runtime: RuntimeKind,
        script: &Path,
        marshaled_args: &[String],
        env: HashMap<String, String>,
    ) -> Self {
        let working_dir = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(marshaled_args.iter().cloned());
        Self {
            program: runtime.interpreter().to_string(),
            args,
            working_dir,
            env,
        }
    }
}

/// Classified result of one attempt
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The ledger row that was appended for this attempt
    pub invocation: RunInvocation,

    /// Full parsed payload for structured successes; previews in the
    /// invocation are bounded, this is not
    pub payload: Option<Value>,
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

enum StdoutKind {
    Empty,
    Structured(Value),
    Opaque,
}

pub struct ProcessExecutor {
    config: ProcessExecutorConfig,
    registry: Arc<RunningRegistry>,
    artifacts: Arc<ArtifactStore>,
    ledger: Arc<dyn RunLedger>,
    notifier: Arc<dyn Notifier>,
}

impl ProcessExecutor {
    pub fn new(
        config: ProcessExecutorConfig,
        registry: Arc<RunningRegistry>,
        artifacts: Arc<ArtifactStore>,
        ledger: Arc<dyn RunLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry,
            artifacts,
            ledger,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<RunningRegistry> {
        &self.registry
    }

    /// Run one marshaled command to a classified, ledgered outcome
    pub async fn execute(
        &self,
        record: &ScriptRecord,
        command: CommandLine,
        params: Value,
        timeout_override: Option<Duration>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let timeout = timeout_override.unwrap_or(self.config.timeout);
        let invocation_id = InvocationId::new();
        let started_at = Utc::now();

        debug!(
            invocation = %invocation_id,
            script = %record.name,
            program = %command.program,
            timeout_secs = timeout.as_secs_f64(),
            "spawning script process"
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .env_clear()
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", command.program, e)))?;

        // Readers own the pipes so the child handle stays killable
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Spawn("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Spawn("failed to capture stderr".to_string()))?;
        let stdout_task = tokio::spawn(read_stream(stdout));
        let stderr_task = tokio::spawn(read_stream(stderr));

        let (kill_tx, mut kill_rx) = oneshot::channel();
        self.registry
            .register(RunningJob {
                invocation_id,
                script_id: record.id,
                script_name: record.name.clone(),
                started_at,
                kill_tx,
            })
            .await;

        let wait = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Ok(WaitOutcome::Exited(status)),
                Err(e) => Err(ExecutionError::Io(e)),
            },
            _ = tokio::time::sleep(timeout) => Ok(WaitOutcome::TimedOut),
            _ = &mut kill_rx => Ok(WaitOutcome::Cancelled),
        };
        let wait = match wait {
            Ok(wait) => wait,
            Err(err) => {
                self.registry.remove(invocation_id).await;
                return Err(err);
            }
        };

        if !matches!(wait, WaitOutcome::Exited(_)) {
            if let Err(err) = child.start_kill() {
                warn!(invocation = %invocation_id, error = %err, "failed to kill child process");
            }
            if tokio::time::timeout(self.config.termination_grace, child.wait())
                .await
                .is_err()
            {
                warn!(invocation = %invocation_id, "child did not exit within the termination grace period");
            }
        }

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let finished_at = Utc::now();

        let mut invocation = RunInvocation {
            id: invocation_id,
            script_id: record.id,
            script_name: record.name.clone(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            status: RunStatus::Failure,
            params,
            output_preview: None,
            error: None,
            artifact: None,
        };
        let mut payload = None;

        match wait {
            WaitOutcome::Cancelled => {
                invocation.error = Some("terminated by operator".to_string());
            }
            WaitOutcome::TimedOut => {
                // Partial output is discarded, not classified
                invocation.status = RunStatus::Timeout;
                invocation.error = Some(format!("timed out after {:.1}s", timeout.as_secs_f64()));
            }
            WaitOutcome::Exited(status) if status.success() => match classify_stdout(&stdout_bytes) {
                StdoutKind::Empty => {
                    invocation.status = RunStatus::Success;
                }
                StdoutKind::Structured(value) => {
                    invocation.status = RunStatus::Success;
                    invocation.output_preview =
                        Some(clip_chars(&value.to_string(), self.config.stdout_preview_chars));
                    payload = Some(value);
                }
                StdoutKind::Opaque => match self.artifacts.save(&record.name, &stdout_bytes).await {
                    Ok(artifact) => {
                        invocation.status = RunStatus::Success;
                        invocation.artifact = Some(artifact);
                    }
                    Err(err) => {
                        invocation.error = Some(format!("failed to persist output artifact: {err}"));
                    }
                },
            },
            WaitOutcome::Exited(status) => {
                let code = status.code().unwrap_or(-1);
                let stderr = String::from_utf8_lossy(&stderr_bytes);
                let stderr = stderr.trim();
                invocation.error = Some(if stderr.is_empty() {
                    format!("exited with code {code}")
                } else {
                    format!(
                        "exited with code {code}: {}",
                        clip_chars(stderr, self.config.diagnostic_preview_chars)
                    )
                });
            }
        }

        info!(
            invocation = %invocation_id,
            script = %record.name,
            status = %invocation.status,
            duration_ms = invocation.duration_ms,
            "execution finished"
        );

        self.registry.remove(invocation_id).await;
        self.ledger.append(invocation.clone()).await?;

        if record.notify {
            let notifier = self.notifier.clone();
            let title = record.name.clone();
            let body = format!(
                "finished with status {} in {} ms",
                invocation.status, invocation.duration_ms
            );
            tokio::spawn(async move {
                notifier.notify(&title, &body).await;
            });
        }

        Ok(ExecutionOutcome { invocation, payload })
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut stream: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    buf
}

/// Exit code 0 output is structured only if it is UTF-8 that parses
/// as one JSON document
fn classify_stdout(bytes: &[u8]) -> StdoutKind {
    if bytes.is_empty() {
        return StdoutKind::Empty;
    }
    let parsed = std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(text.trim()).ok());
    match parsed {
        Some(value) => StdoutKind::Structured(value),
        None => StdoutKind::Opaque,
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
