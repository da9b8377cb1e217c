//! Print history records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished print, handed to whatever persists print history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintHistoryEntry {
    /// File that was printed
    pub file_name: String,
    /// File size in bytes
    pub total_bytes: u64,
    /// When the job was first seen
    pub started_at: DateTime<Utc>,
    /// When the job finalized
    pub finished_at: DateTime<Utc>,
}

impl PrintHistoryEntry {
    /// Wall-clock duration of the job
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
