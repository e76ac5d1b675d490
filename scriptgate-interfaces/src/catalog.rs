//! Script catalog store contract
//!
//! The catalog is the authoritative mapping from script identity to
//! its discovered state. The scanner writes it, request handling reads
//! it. Mutations are scoped to a single record, so backends need no
//! cross-record transactions.

use async_trait::async_trait;
use std::path::Path;

use scriptgate_core::{ScriptId, ScriptRecord};

use crate::error::StoreError;

/// Catalog store contract
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch a record by its stable id
    async fn get(&self, id: ScriptId) -> Result<Option<ScriptRecord>, StoreError>;

    /// Fetch a record by its root-relative path
    async fn get_by_path(&self, path: &Path) -> Result<Option<ScriptRecord>, StoreError>;

    /// Insert or replace a record, keyed by id
    async fn upsert(&self, record: ScriptRecord) -> Result<(), StoreError>;

    /// All records, in unspecified order
    async fn list(&self) -> Result<Vec<ScriptRecord>, StoreError>;
}
