//! Realtime channel: transport → hub → auth-gated values.

mod bridge;
mod hub;
mod ws;

pub use bridge::{ChannelValue, RealtimeBridge, sync_essentials};
pub use hub::{EventHub, Subscription};
pub use ws::{TransportError, WsTransport, backoff, parse_frame};
