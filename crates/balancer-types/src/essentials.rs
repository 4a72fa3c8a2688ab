//! The compact "app essentials" snapshot pushed over the realtime channel.

use serde::{Deserialize, Serialize};

/// Market state reduced to what the header widgets show.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactMarketState {
    /// Average state across the tracked symbols, in `[-2, 2]`.
    pub average: f64,
    /// Unix milliseconds of the window the state was computed for.
    pub event_time: u64,
}

/// Counts and market state the whole UI depends on.
///
/// A snapshot always replaces the previous one; fields are never merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppEssentials {
    pub unread_notifications: u32,
    pub unread_api_errors: u32,
    #[serde(default)]
    pub market_state: Option<CompactMarketState>,
}
