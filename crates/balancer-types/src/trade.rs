//! Executed trades.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::Record;

/// Side of a trade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A trade executed by a position, ordered in lists by `event_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    /// Unix milliseconds at which the exchange reported the fill.
    pub event_time: u64,
}

impl Trade {
    /// Ascending comparison on `event_time`, the sort key trade lists use.
    pub fn cmp_event_time(a: &Trade, b: &Trade) -> Ordering {
        a.event_time.cmp(&b.event_time)
    }

    /// Quote-asset notional of the fill.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

impl Record for Trade {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}
