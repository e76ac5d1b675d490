//! Request-path orchestration
//!
//! One run request flows lookup → runnable check → media resolution →
//! marshal → dependency environment → execute. Everything that can
//! reject a request does so before a process ever spawns.

use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use scriptgate_core::{LoadState, ParamType, ScriptId, ScriptRecord};
use scriptgate_deps::{execution_environment, DepsCacheManager};
use scriptgate_interfaces::{CatalogStore, FileAccessChecker, MediaError, MediaResolver};

use crate::error::GatewayError;
use crate::executor::{CommandLine, ExecutionOutcome, ProcessExecutor};
use crate::marshal::{build_cli_args, value_text};
use crate::registry::RunningJobInfo;

/// How a request names a script: by id, or by relative path / display
/// name
#[derive(Debug, Clone)]
pub enum ScriptSelector {
    Id(ScriptId),
    Reference(String),
}

impl ScriptSelector {
    pub fn parse(text: &str) -> Self {
        match Uuid::parse_str(text) {
            Ok(id) => Self::Id(ScriptId::from(id)),
            Err(_) => Self::Reference(text.to_string()),
        }
    }
}

impl fmt::Display for ScriptSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Reference(text) => f.write_str(text),
        }
    }
}

/// The discovery→marshal→execute pipeline behind one entry point
pub struct ScriptGateway {
    catalog: Arc<dyn CatalogStore>,
    deps: Arc<DepsCacheManager>,
    executor: Arc<ProcessExecutor>,
    resolver: Arc<dyn MediaResolver>,
    access: Arc<dyn FileAccessChecker>,
    roots: Vec<PathBuf>,
}

impl ScriptGateway {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        deps: Arc<DepsCacheManager>,
        executor: Arc<ProcessExecutor>,
        resolver: Arc<dyn MediaResolver>,
        access: Arc<dyn FileAccessChecker>,
        roots: Vec<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            deps,
            executor,
            resolver,
            access,
            roots,
        }
    }

    /// Execute one script run to a classified outcome
    pub async fn run(
        &self,
        selector: &ScriptSelector,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<ExecutionOutcome, GatewayError> {
        let record = self.lookup(selector).await?;
        self.require_runnable(&record)?;
        let script_path = self.resolve_script_path(&record)?;

        let raw = match params {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => return Err(GatewayError::InvalidParams),
        };
        let resolved = self.resolve_media(&record, raw).await?;
        let marshaled = build_cli_args(&record.schema, &resolved)?;

        let entry = self.deps.ensure_environment(&script_path, false).await?;
        let env = execution_environment(entry.as_ref());
        let command = CommandLine::for_script(record.runtime, &script_path, &marshaled.args, env);

        debug!(script = %record.name, args = ?marshaled.args, "dispatching run");
        let outcome = self
            .executor
            .execute(&record, command, Value::Object(marshaled.effective), timeout)
            .await?;
        Ok(outcome)
    }

    /// Kill every running invocation of the selected script
    pub async fn cancel(&self, selector: &ScriptSelector) -> Result<usize, GatewayError> {
        let record = self.lookup(selector).await?;
        Ok(self.executor.registry().cancel_script(record.id).await?)
    }

    pub async fn running(&self) -> Vec<RunningJobInfo> {
        self.executor.registry().list().await
    }

    pub async fn scripts(&self) -> Result<Vec<ScriptRecord>, GatewayError> {
        Ok(self.catalog.list().await?)
    }

    async fn lookup(&self, selector: &ScriptSelector) -> Result<ScriptRecord, GatewayError> {
        let found = match selector {
            ScriptSelector::Id(id) => self.catalog.get(*id).await?,
            ScriptSelector::Reference(text) => match self.catalog.get_by_path(Path::new(text)).await? {
                Some(record) => Some(record),
                None => self
                    .catalog
                    .list()
                    .await?
                    .into_iter()
                    .find(|record| record.name == *text),
            },
        };
        found.ok_or_else(|| GatewayError::ScriptNotFound {
            reference: selector.to_string(),
        })
    }

    fn require_runnable(&self, record: &ScriptRecord) -> Result<(), GatewayError> {
        match &record.load_state {
            LoadState::Loaded => Ok(()),
            LoadState::Pending => Err(GatewayError::NotLoaded {
                name: record.name.clone(),
                reason: "schema discovery has not completed".to_string(),
            }),
            LoadState::Failed { diagnostic } => Err(GatewayError::NotLoaded {
                name: record.name.clone(),
                reason: diagnostic.clone(),
            }),
        }
    }

    /// Records carry root-relative paths; find the root that currently
    /// holds the file
    fn resolve_script_path(&self, record: &ScriptRecord) -> Result<PathBuf, GatewayError> {
        for root in &self.roots {
            let candidate = root.join(&record.path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(GatewayError::SourceMissing {
            path: record.path.clone(),
        })
    }

    /// Turn file parameters into vetted local paths before marshaling
    /// sees them
    async fn resolve_media(
        &self,
        record: &ScriptRecord,
        mut params: Map<String, Value>,
    ) -> Result<Map<String, Value>, GatewayError> {
        for (name, spec) in &record.schema {
            if spec.param_type != ParamType::File {
                continue;
            }
            let Some(value) = params.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            let reference = value_text(value);
            let resolved = self.resolver.resolve(&reference).await?;
            if !self.access.is_allowed(&resolved) {
                return Err(GatewayError::Media(MediaError::AccessDenied(resolved)));
            }
            params.insert(name.clone(), Value::String(resolved.to_string_lossy().into_owned()));
        }
        Ok(params)
    }
}
