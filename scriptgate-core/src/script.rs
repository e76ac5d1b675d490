//! Script catalog records and parameter schemas

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::SchemaError;
use crate::ids::ScriptId;
use crate::runtime::RuntimeKind;

/// Declared parameter types a script may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    File,
    Json,
    Url,
    Choice,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::File => "file",
            ParamType::Json => "json",
            ParamType::Url => "url",
            ParamType::Choice => "choice",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(ParamType::Str),
            "int" => Ok(ParamType::Int),
            "float" => Ok(ParamType::Float),
            "bool" => Ok(ParamType::Bool),
            "file" => Ok(ParamType::File),
            "json" => Ok(ParamType::Json),
            "url" => Ok(ParamType::Url),
            "choice" => Ok(ParamType::Choice),
            _ => Err(format!("Unknown parameter type: {}", s)),
        }
    }
}

/// One declared parameter of a script's self-reported schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// CLI flag the value is passed under, e.g. `--count`
    pub flag: String,

    /// Declared value type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Whether the parameter must be supplied
    pub required: bool,

    /// Default value applied by the script itself when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Human-readable help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    /// Allowed values for `choice` parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<serde_json::Value>>,
}

/// Ordered parameter schema: name to spec, in declaration order
///
/// Declaration order is load-bearing. Argument marshaling iterates this
/// map to produce a reproducible argv, so the map type must preserve
/// the order the script reported its parameters in.
pub type Schema = IndexMap<String, ParamSpec>;

/// Parse and validate a discovery response into a [`Schema`]
///
/// The text must be a single JSON object whose values carry at least
/// `flag`, `type` and `required`. Choice parameters must list at least
/// one choice.
pub fn parse_schema(text: &str) -> Result<Schema, SchemaError> {
    let root: IndexMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| SchemaError::Malformed(e.to_string()))?;

    let mut schema = Schema::with_capacity(root.len());
    for (name, spec) in root {
        let obj = spec
            .as_object()
            .ok_or_else(|| SchemaError::SpecNotAnObject { name: name.clone() })?;
        for field in ["flag", "type", "required"] {
            if !obj.contains_key(field) {
                return Err(SchemaError::MissingField {
                    name: name.clone(),
                    field,
                });
            }
        }
        let parsed: ParamSpec = serde_json::from_value(spec).map_err(|e| SchemaError::InvalidSpec {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        if parsed.param_type == ParamType::Choice
            && parsed.choices.as_ref().map_or(true, |c| c.is_empty())
        {
            return Err(SchemaError::NoChoices { name });
        }
        schema.insert(name, parsed);
    }
    Ok(schema)
}

/// Load state of a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// Seen on disk, schema not yet discovered
    Pending,
    /// Schema discovered and validated
    Loaded,
    /// Discovery failed; the script cannot be executed
    Failed { diagnostic: String },
}

impl LoadState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }

    /// Diagnostic text for failed entries
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            LoadState::Failed { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }
}

/// One catalog entry: a discovered script and its declared schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    /// Unique identifier, stable across rescans of the same path
    pub id: ScriptId,

    /// Path relative to the script root it was discovered under
    pub path: PathBuf,

    /// Display name (the file stem)
    pub name: String,

    /// Runtime the script executes under
    pub runtime: RuntimeKind,

    /// Strong hash of the file content at discovery time
    pub content_hash: String,

    /// Discovery outcome
    pub load_state: LoadState,

    /// Self-reported parameter schema, empty until loaded
    #[serde(default)]
    pub schema: Schema,

    /// Whether run completions should raise a notification
    pub notify: bool,

    /// When the record was first created
    pub created_at: DateTime<Utc>,

    /// When the record was last updated by a scan
    pub updated_at: DateTime<Utc>,
}

impl ScriptRecord {
    /// Create a new pending record for a freshly discovered file
    pub fn new(path: impl Into<PathBuf>, runtime: RuntimeKind, content_hash: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let now = Utc::now();
        Self {
            id: ScriptId::new(),
            path,
            name,
            runtime,
            content_hash: content_hash.into(),
            load_state: LoadState::Pending,
            schema: Schema::new(),
            notify: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder pattern for enabling run notifications
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    /// Mark the record loaded with a validated schema
    pub fn mark_loaded(&mut self, schema: Schema) {
        self.schema = schema;
        self.load_state = LoadState::Loaded;
        self.updated_at = Utc::now();
    }

    /// Mark the record failed with a diagnostic; any previously loaded
    /// schema is dropped
    pub fn mark_failed(&mut self, diagnostic: impl Into<String>) {
        self.schema = Schema::new();
        self.load_state = LoadState::Failed {
            diagnostic: diagnostic.into(),
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_schema_preserves_declaration_order() {
        let text = r#"{
            "zeta": {"flag": "--zeta", "type": "str", "required": false},
            "alpha": {"flag": "--alpha", "type": "int", "required": true},
            "mid": {"flag": "--mid", "type": "bool", "required": false}
        }"#;
        let schema = parse_schema(text).unwrap();
        let names: Vec<&str> = schema.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parse_schema_rejects_non_object_root() {
        assert!(matches!(parse_schema("[1, 2]"), Err(SchemaError::Malformed(_))));
        assert!(matches!(parse_schema("not json"), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn parse_schema_rejects_missing_required_fields() {
        let text = r#"{"n": {"flag": "--n", "type": "int"}}"#;
        let err = parse_schema(text).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingField { field: "required", .. }
        ));
    }

    #[test]
    fn parse_schema_rejects_unknown_type() {
        let text = r#"{"n": {"flag": "--n", "type": "quaternion", "required": true}}"#;
        assert!(matches!(parse_schema(text), Err(SchemaError::InvalidSpec { .. })));
    }

    #[test]
    fn parse_schema_requires_choices_for_choice_params() {
        let text = r#"{"mode": {"flag": "--mode", "type": "choice", "required": true}}"#;
        assert!(matches!(parse_schema(text), Err(SchemaError::NoChoices { .. })));

        let text = r#"{"mode": {"flag": "--mode", "type": "choice", "required": true, "choices": []}}"#;
        assert!(matches!(parse_schema(text), Err(SchemaError::NoChoices { .. })));

        let text =
            r#"{"mode": {"flag": "--mode", "type": "choice", "required": true, "choices": ["a"]}}"#;
        assert!(parse_schema(text).is_ok());
    }

    #[test]
    fn parse_schema_keeps_optional_fields() {
        let text = r#"{
            "n": {"flag": "--n", "type": "int", "required": false,
                  "default": 3, "help": "iteration count"}
        }"#;
        let schema = parse_schema(text).unwrap();
        let spec = &schema["n"];
        assert_eq!(spec.default, Some(serde_json::json!(3)));
        assert_eq!(spec.help.as_deref(), Some("iteration count"));
    }

    #[test]
    fn record_name_is_file_stem() {
        let rec = ScriptRecord::new("jobs/report.py", RuntimeKind::Python, "abc");
        assert_eq!(rec.name, "report");
        assert_eq!(rec.load_state, LoadState::Pending);
    }

    #[test]
    fn mark_failed_drops_schema() {
        let mut rec = ScriptRecord::new("a.py", RuntimeKind::Python, "abc");
        rec.mark_loaded(parse_schema(r#"{"n": {"flag": "--n", "type": "int", "required": true}}"#).unwrap());
        assert!(rec.load_state.is_loaded());
        rec.mark_failed("probe exited with 1");
        assert!(rec.schema.is_empty());
        assert_eq!(rec.load_state.diagnostic(), Some("probe exited with 1"));
    }
}
