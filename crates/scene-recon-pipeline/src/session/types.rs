//! Session bookkeeping: metadata, audit log entries and export records.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Identity and timestamps of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Session kind, fixed for a given session type.
    pub kind: String,
    pub schema_version: u32,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub last_modified: u64,
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(kind: impl Into<String>, schema_version: u32) -> Self {
        let now = current_timestamp();
        Self {
            kind: kind.into(),
            schema_version,
            created_at: now,
            last_modified: now,
            description: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = current_timestamp();
    }
}

/// One audit-log line. Not meant for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    /// Step name, e.g. `reconstruct` or `export`.
    pub operation: String,
    pub success: bool,
    /// Summary on success, error message on failure.
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes,
        }
    }

    pub fn failure(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: false,
            notes: Some(error.into()),
        }
    }
}

/// An artifact written from the session, with the scene version it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord<E> {
    pub timestamp: u64,
    pub scene_version: u64,
    pub export: E,
}

impl<E> ExportRecord<E> {
    pub fn new(export: E, scene_version: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            scene_version,
            export,
        }
    }
}

/// Current Unix time in seconds; 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
