//! Shared record and snapshot types for the Balancer client.
//!
//! This crate is the leaf of the workspace: the entities the backend serves,
//! the compact snapshots it pushes, and the wire error convention. It has
//! **no internal balancer dependencies**.
//!
//! # Key Types
//!
//! |----------------------|---------------------------------------------|
//! | Type                 | Purpose                                     |
//! |----------------------|---------------------------------------------|
//! | [`Record`]           | Keyed entity that can live in a collection  |
//! | [`BlacklistedIp`]    | One entry of the IP blacklist               |
//! | [`Trade`]            | One executed trade, ordered by event time   |
//! | [`ApiErrorRecord`]   | One API error logged by the backend         |
//! | [`AppEssentials`]    | Compact realtime snapshot (counts + market) |
//! | [`DatabaseSummary`]  | Read-mostly database size summary           |
//! | [`ServerSummary`]    | Host resource summary                       |
//! | [`ApiError`]         | Decoded `{ message, code }` server error    |
//! |----------------------|---------------------------------------------|

pub mod api_error;
pub mod blacklist;
pub mod essentials;
pub mod record;
pub mod summary;
pub mod trade;

pub use api_error::{ApiError, ApiErrorRecord};
pub use blacklist::BlacklistedIp;
pub use essentials::{AppEssentials, CompactMarketState};
pub use record::{Record, SortDirection};
pub use summary::{DatabaseSummary, ServerSummary, TableSummary};
pub use trade::{Trade, TradeSide};
