//! Registry of in-flight invocations
//!
//! Keyed by invocation id, inserted on spawn and removed on
//! completion, so overlapping runs of the same script each keep their
//! own kill handle. One mutex guards the whole map.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use scriptgate_core::{InvocationId, ScriptId};

use crate::error::ExecutionError;

/// A live invocation and the channel that kills it
pub struct RunningJob {
    pub invocation_id: InvocationId,
    pub script_id: ScriptId,
    pub script_name: String,
    pub started_at: DateTime<Utc>,
    pub(crate) kill_tx: oneshot::Sender<()>,
}

/// Snapshot of one running invocation, for listings
#[derive(Debug, Clone, Serialize)]
pub struct RunningJobInfo {
    pub invocation_id: InvocationId,
    pub script_id: ScriptId,
    pub script_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RunningRegistry {
    jobs: Mutex<HashMap<InvocationId, RunningJob>>,
}

impl RunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, job: RunningJob) {
        debug!(invocation = %job.invocation_id, script = %job.script_name, "registered running job");
        self.jobs.lock().await.insert(job.invocation_id, job);
    }

    /// Forget a finished invocation; false when cancellation already
    /// removed it
    pub(crate) async fn remove(&self, invocation_id: InvocationId) -> bool {
        self.jobs.lock().await.remove(&invocation_id).is_some()
    }

    /// Kill every running invocation of a script
    ///
    /// Returns how many kill signals were sent. A script with nothing
    /// in flight is an error, and nothing is written anywhere.
    pub async fn cancel_script(&self, script_id: ScriptId) -> Result<usize, ExecutionError> {
        let mut jobs = self.jobs.lock().await;
        let matching: Vec<InvocationId> = jobs
            .values()
            .filter(|job| job.script_id == script_id)
            .map(|job| job.invocation_id)
            .collect();
        if matching.is_empty() {
            return Err(ExecutionError::NotRunning { script_id });
        }
        for invocation_id in &matching {
            if let Some(job) = jobs.remove(invocation_id) {
                debug!(invocation = %invocation_id, script = %job.script_name, "cancelling running job");
                // The receiver may already be gone if the run just
                // finished naturally; that race resolves in its favor.
                let _ = job.kill_tx.send(());
            }
        }
        Ok(matching.len())
    }

    pub async fn list(&self) -> Vec<RunningJobInfo> {
        self.jobs
            .lock()
            .await
            .values()
            .map(|job| RunningJobInfo {
                invocation_id: job.invocation_id,
                script_id: job.script_id,
                script_name: job.script_name.clone(),
                started_at: job.started_at,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
