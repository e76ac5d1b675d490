//! Run ledger contract

use async_trait::async_trait;

use scriptgate_core::{RunInvocation, ScriptId};

use crate::error::StoreError;

/// Append-only history of execution attempts
///
/// Exactly one append happens per attempt, performed by the executor
/// after classification. Rows are immutable once written.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Append one invocation row
    async fn append(&self, invocation: RunInvocation) -> Result<(), StoreError>;

    /// Most recent rows, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<RunInvocation>, StoreError>;

    /// Most recent rows for one script, newest first
    async fn recent_for_script(
        &self,
        script_id: ScriptId,
        limit: usize,
    ) -> Result<Vec<RunInvocation>, StoreError>;
}
