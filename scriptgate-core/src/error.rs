//! Core error types

use thiserror::Error;

/// Why a discovery response failed schema validation
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema is not a JSON object: {0}")]
    Malformed(String),

    #[error("parameter '{name}' is not an object")]
    SpecNotAnObject { name: String },

    #[error("parameter '{name}' is missing required field '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("parameter '{name}' is invalid: {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("choice parameter '{name}' declares no choices")]
    NoChoices { name: String },
}
