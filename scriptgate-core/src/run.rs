//! Run ledger rows: the immutable record of one execution attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{InvocationId, ScriptId};

/// Terminal status of an execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
    Timeout,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Reference to a binary output artifact persisted outside the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Retrieval locator (path relative to the output root, or a full
    /// URL when a public base is configured)
    pub locator: String,

    /// Generated, content-opaque filename
    pub filename: String,

    /// Size of the persisted bytes
    pub size: u64,
}

/// One ledger row, written exactly once per execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInvocation {
    pub id: InvocationId,
    pub script_id: ScriptId,
    pub script_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: RunStatus,

    /// Snapshot of the effective parameters the run was marshaled from
    pub params: serde_json::Value,

    /// Bounded preview of structured stdout, for audit display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,

    /// Diagnostic text for failures and timeouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Reference to a persisted binary artifact, when stdout was not
    /// structured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
}
