//! Argument marshaling
//!
//! Turns `(schema, raw parameter map)` into a reproducible argv. The
//! walk follows schema declaration order, never the iteration order of
//! the input map, so the same request always produces the same command
//! line. Parameters the schema does not declare are rejected outright;
//! nothing undeclared ever reaches the child's argv.

use serde_json::{Map, Value};

use scriptgate_core::{ParamSpec, ParamType, Schema};

use crate::error::MarshalError;

/// Marshaled argv plus the audit snapshot of what each parameter
/// became
#[derive(Debug, Clone, Default)]
pub struct MarshaledCommand {
    pub args: Vec<String>,
    pub effective: Map<String, Value>,
}

/// Build the script's argument vector from its schema and a raw
/// parameter map
///
/// Fails atomically: any rejection means no argv at all, and no
/// process is ever spawned from a rejected request. A JSON `null`
/// value counts as absent.
pub fn build_cli_args(schema: &Schema, params: &Map<String, Value>) -> Result<MarshaledCommand, MarshalError> {
    for name in params.keys() {
        if !schema.contains_key(name) {
            return Err(MarshalError::UndeclaredParameter { name: name.clone() });
        }
    }

    let mut command = MarshaledCommand::default();
    for (name, spec) in schema {
        let value = params.get(name).filter(|v| !v.is_null());
        let Some(value) = value else {
            if spec.required {
                return Err(MarshalError::MissingParameter { name: name.clone() });
            }
            continue;
        };
        let token = coerce(name, spec, value)?;
        command.args.push(spec.flag.clone());
        command.args.push(token.clone());
        command.effective.insert(name.clone(), Value::String(token));
    }
    Ok(command)
}

fn coerce(name: &str, spec: &ParamSpec, value: &Value) -> Result<String, MarshalError> {
    let raw = value_text(value);
    match spec.param_type {
        ParamType::Int => {
            let trimmed = raw.trim();
            trimmed
                .parse::<i64>()
                .map_err(|_| MarshalError::TypeMismatch {
                    name: name.to_string(),
                    expected: "an integer".to_string(),
                    value: raw.clone(),
                })?;
            Ok(trimmed.to_string())
        }
        ParamType::Float => {
            let trimmed = raw.trim();
            trimmed
                .parse::<f64>()
                .map_err(|_| MarshalError::TypeMismatch {
                    name: name.to_string(),
                    expected: "a number".to_string(),
                    value: raw.clone(),
                })?;
            Ok(trimmed.to_string())
        }
        ParamType::Bool => {
            // Anything outside the truthy set is false, not an error
            let truthy = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes");
            Ok(if truthy { "1" } else { "0" }.to_string())
        }
        ParamType::Choice => {
            let allowed: Vec<String> = spec.choices.iter().flatten().map(value_text).collect();
            if allowed.iter().any(|choice| *choice == raw) {
                Ok(raw)
            } else {
                Err(MarshalError::TypeMismatch {
                    name: name.to_string(),
                    expected: format!("one of [{}]", allowed.join(", ")),
                    value: raw,
                })
            }
        }
        ParamType::Str | ParamType::File | ParamType::Json | ParamType::Url => Ok(raw),
    }
}

/// The textual form a parameter value takes on the command line
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
