//! The keyed-record abstraction shared by every list the client caches.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An entity that can be held in a reconciled collection.
///
/// The key must be unique within one collection. Records are cloned when a
/// new collection is derived from an old one, so they should stay small.
pub trait Record: Clone + fmt::Debug {
    type Key: Clone + Eq + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// Direction of an explicit sort key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Apply the direction to an ascending comparison result.
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}
