//! Auxiliary service contracts: notifications, media resolution,
//! file access policy

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a media reference could not be turned into a local path
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("cannot resolve '{reference}': {reason}")]
    Unresolvable { reference: String, reason: String },

    #[error("access to '{0}' is denied by policy")]
    AccessDenied(PathBuf),
}

/// Fire-and-forget notification delivery
///
/// Failures are the implementation's problem; callers never await a
/// delivery outcome beyond the call itself.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str);
}

/// Local file access policy
pub trait FileAccessChecker: Send + Sync {
    /// Whether the gateway may hand this path to a script
    fn is_allowed(&self, path: &Path) -> bool;
}

/// Turns a parameter's file/url reference into a local path
///
/// Invoked before argument marshaling; marshaling itself only ever
/// sees local paths.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<PathBuf, MediaError>;
}
