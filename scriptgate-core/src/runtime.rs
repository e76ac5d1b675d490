//! Supported script runtimes
//!
//! Runtime dispatch is a closed enum rather than string comparison:
//! every runtime-specific decision (interpreter, file extension,
//! entry-point marker, module search path variable) hangs off
//! [`RuntimeKind`] so no component re-implements the branching.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

static PYTHON_MAIN_GUARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"if\s+__name__\s*==\s*["']__main__["']\s*:"#).expect("static regex"));

/// The runtimes a script may declare through its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Python,
    Js,
}

impl RuntimeKind {
    /// Classify a script file by extension, if it is a supported runtime
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(RuntimeKind::Python),
            Some("js") | Some("mjs") => Some(RuntimeKind::Js),
            _ => None,
        }
    }

    /// The interpreter binary used to launch scripts of this runtime
    pub fn interpreter(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python3",
            RuntimeKind::Js => "node",
        }
    }

    /// Environment variable the interpreter consults for extra module
    /// search paths
    pub fn search_path_var(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "PYTHONPATH",
            RuntimeKind::Js => "NODE_PATH",
        }
    }

    /// Whether the source text carries the runtime's "runnable as a
    /// standalone program" marker
    ///
    /// Files without the marker are library modules and are skipped by
    /// discovery.
    pub fn has_entrypoint(&self, source: &str) -> bool {
        match self {
            RuntimeKind::Python => PYTHON_MAIN_GUARD.is_match(source),
            RuntimeKind::Js => source.contains("module.exports") || source.contains("export default"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Js => "js",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" => Ok(RuntimeKind::Python),
            "js" | "javascript" => Ok(RuntimeKind::Js),
            _ => Err(format!("Unknown runtime: {}", s)),
        }
    }
}
