//! Identifier newtypes for scripts and run invocations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a catalog script (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptId(pub Uuid);

impl ScriptId {
    /// Create a new random script ID
    pub fn new() -> Self {
        ScriptId(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ScriptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ScriptId {
    fn from(uuid: Uuid) -> Self {
        ScriptId(uuid)
    }
}

impl From<ScriptId> for Uuid {
    fn from(id: ScriptId) -> Self {
        id.0
    }
}

impl FromStr for ScriptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ScriptId)
    }
}

/// Unique identifier for a single execution attempt
///
/// Every spawn gets a fresh invocation ID, so concurrent runs of the
/// same script remain distinguishable in the running-job registry and
/// the run ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Create a new random invocation ID
    pub fn new() -> Self {
        InvocationId(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InvocationId {
    fn from(uuid: Uuid) -> Self {
        InvocationId(uuid)
    }
}

impl From<InvocationId> for Uuid {
    fn from(id: InvocationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_ids_are_unique() {
        assert_ne!(ScriptId::new(), ScriptId::new());
    }

    #[test]
    fn script_id_round_trips_through_display() {
        let id = ScriptId::new();
        let parsed: ScriptId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
