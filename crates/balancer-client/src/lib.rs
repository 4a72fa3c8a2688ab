//! Balancer client state core
//!
//! Keeps locally cached collections consistent with the backend while data
//! arrives from paginated HTTP fetches, periodic polling and realtime pushes.
//! Nothing here depends on a UI framework: state is exposed through
//! `tokio::sync::watch` receivers that any renderer can follow.
//!
//! ```text
//!   BalancerApi ──▶ ListOrchestrator ──▶ reconcile ──▶ watch<ListState>
//!                        ▲
//!   WsTransport ──▶ EventHub ──▶ RealtimeBridge ──▶ ChannelValue ──▶ Store
//!                                     ▲
//!                               AuthSlice (gate)
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dialog;
pub mod error;
pub mod fetch;
pub mod lists;
pub mod notify;
pub mod realtime;
pub mod reconcile;
pub mod store;

pub use api::{BalancerApi, Credentials, Session};
pub use cache::RevalidatingCache;
pub use config::{ClientConfig, ConfigError};
pub use dialog::{DialogPhase, LazyDialog};
pub use error::ClientError;
pub use fetch::{
    FetchOutcome, ListOrchestrator, ListSource, ListState, PageQuery, ResourceOrchestrator,
    ResourceSource, ResourceState, SkipReason,
};
pub use notify::{Toast, ToastLevel, Toaster};
pub use realtime::{ChannelValue, EventHub, RealtimeBridge, Subscription, WsTransport, sync_essentials};
pub use reconcile::{Action, ActionKind, Collection, ReconcileError, SortSpec, reconcile};
pub use store::{
    AuthSlice, ConfirmationPayload, DialogKind, DialogSlice, DialogSlices, DialogState,
    EssentialsSlice, Store,
};
