//! IP blacklist entries.

use serde::{Deserialize, Serialize};

use crate::Record;

/// An IP address the backend refuses requests from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistedIp {
    pub id: u64,
    pub ip: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
}

impl BlacklistedIp {
    pub fn new(id: u64, ip: impl Into<String>) -> Self {
        Self { id, ip: ip.into(), created_at: 0 }
    }
}

impl Record for BlacklistedIp {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}
