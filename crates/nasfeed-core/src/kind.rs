//! Data-kind identifiers.
//!
//! A data kind names one telemetry stream that is polled from the backend and
//! broadcast to viewers (e.g. "system.status", "compression.update"). Kinds
//! are also the unit of failure isolation: every kind has its own breaker and
//! cache slot.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Overall host status (hostname, cpu, memory, uptime).
pub const SYSTEM_STATUS: &str = "system.status";
/// Status of the backend worker agents.
pub const AGENTS_STATUS: &str = "agents.status";
/// Progress of compression jobs.
pub const COMPRESSION_UPDATE: &str = "compression.update";
/// Storage pool usage.
pub const STORAGE_POOLS: &str = "storage.pools";

/// Identifier for one polled telemetry stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataKind(String);

impl DataKind {
    /// Create a data kind, rejecting empty names and names containing whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidKind("empty kind".to_string()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidKind(format!(
                "kind contains whitespace: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn system_status() -> Self {
        Self(SYSTEM_STATUS.to_string())
    }

    pub fn agents_status() -> Self {
        Self(AGENTS_STATUS.to_string())
    }

    pub fn compression_update() -> Self {
        Self(COMPRESSION_UPDATE.to_string())
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DataKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DataKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DataKind {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DataKind> for String {
    fn from(kind: DataKind) -> Self {
        kind.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_rejects_empty() {
        assert!(DataKind::new("").is_err());
        assert!(DataKind::new("system status").is_err());
    }

    #[test]
    fn test_kind_display_and_borrow() {
        let kind = DataKind::new("storage.pools").unwrap();
        assert_eq!(kind.to_string(), STORAGE_POOLS);

        let mut set = std::collections::HashSet::new();
        set.insert(kind);
        assert!(set.contains("storage.pools"));
    }

    #[test]
    fn test_kind_deserialize_validates() {
        let ok: DataKind = serde_json::from_str(r#""system.status""#).unwrap();
        assert_eq!(ok, DataKind::system_status());

        let err = serde_json::from_str::<DataKind>(r#""""#);
        assert!(err.is_err());
    }
}
