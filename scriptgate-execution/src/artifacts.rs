//! Binary artifact persistence
//!
//! Non-JSON stdout is stored on disk under
//! `<root>/<script>/<timestamp>/` with a generated filename, and the
//! run carries a locator instead of the bytes.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use scriptgate_core::ArtifactRef;

pub struct ArtifactStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one output payload and return its reference
    pub async fn save(&self, script_name: &str, bytes: &[u8]) -> std::io::Result<ArtifactRef> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = self.root.join(script_name).join(&stamp);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}.bin", Uuid::new_v4().simple());
        tokio::fs::write(dir.join(&filename), bytes).await?;
        debug!(script = %script_name, file = %filename, size = bytes.len(), "persisted binary artifact");

        let relative = format!("{script_name}/{stamp}/{filename}");
        let locator = match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), relative),
            None => relative,
        };
        Ok(ArtifactRef {
            locator,
            filename,
            size: bytes.len() as u64,
        })
    }
}
