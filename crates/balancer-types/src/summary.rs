//! Read-mostly summaries shown on the platform dashboard.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub size_bytes: u64,
}

/// Size of the backend database, revalidated on a fixed age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub tables: Vec<TableSummary>,
}

impl DatabaseSummary {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Host resources of the backend, polled while the dashboard is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSummary {
    pub uptime_secs: u64,
    pub cpu_load: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

impl ServerSummary {
    pub fn memory_usage(&self) -> f64 {
        if self.memory_total_bytes == 0 {
            return 0.0;
        }
        self.memory_used_bytes as f64 / self.memory_total_bytes as f64
    }
}
