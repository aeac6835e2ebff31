//! Severity levels accepted by the collector.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity attached to every shipped record.
///
/// Serialized upper-case (`"INFO"`, `"WARNING"`, `"ERROR"`, `"CRITICAL"`),
/// which is the wire form the collector expects in the `level` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
