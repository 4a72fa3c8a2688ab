//! Auth-gated realtime values.
//!
//! A [`ChannelValue`] tracks the latest payload of one named event. Its
//! listener is attached to the [`EventHub`] only while the session is
//! authenticated; signing out detaches it and signing back in re-attaches.
//! The last received value survives a sign-out, it just stops updating.
//!
//! ```text
//!   auth=false ──(sign_in)──▶ attached ──(sign_out)──▶ detached
//!                                │
//!                    publish ──▶ decode ──▶ watch<Option<T>>
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use balancer_types::AppEssentials;

use super::hub::EventHub;
use crate::constants::APP_ESSENTIALS_EVENT;
use crate::store::EssentialsSlice;

/// Hands out [`ChannelValue`]s bound to one hub and one auth flag.
#[derive(Clone)]
pub struct RealtimeBridge {
    hub: EventHub,
    auth: watch::Receiver<bool>,
}

impl RealtimeBridge {
    pub fn new(hub: EventHub, auth: watch::Receiver<bool>) -> Self {
        Self { hub, auth }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Track the latest decoded payload of `event`.
    ///
    /// Must be called inside a tokio runtime. Payloads that do not decode as
    /// `T` are logged and dropped; the previous value stays.
    pub fn channel_value<T>(&self, event: &str) -> ChannelValue<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);
        let hub = self.hub.clone();
        let mut auth = self.auth.clone();
        let event = event.to_string();

        let task = tokio::spawn(async move {
            loop {
                if auth.wait_for(|signed_in| *signed_in).await.is_err() {
                    break;
                }
                let subscription = hub.subscribe(event.clone(), {
                    let tx = Arc::clone(&tx);
                    let event = event.clone();
                    move |payload| match T::deserialize(payload) {
                        Ok(value) => {
                            tx.send_replace(Some(value));
                        }
                        Err(e) => warn!(%event, "dropping undecodable payload: {e}"),
                    }
                });
                debug!(%event, "channel attached");

                let signed_out = auth.wait_for(|signed_in| !*signed_in).await.is_ok();
                drop(subscription);
                debug!(%event, "channel detached");
                if !signed_out {
                    break;
                }
            }
        });

        ChannelValue { rx, task }
    }
}

/// Latest value of a realtime event; `None` until the first message.
///
/// Dropping it detaches the listener.
pub struct ChannelValue<T> {
    rx: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> ChannelValue<T> {
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next value. Errors once the channel can never update
    /// again (the auth source is gone).
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }
}

impl<T> Drop for ChannelValue<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Mirror the app essentials event into the store.
///
/// Runs until the returned handle is aborted or auth goes away.
pub fn sync_essentials(bridge: &RealtimeBridge, essentials: EssentialsSlice) -> JoinHandle<()> {
    let mut value = bridge.channel_value::<AppEssentials>(APP_ESSENTIALS_EVENT);
    tokio::spawn(async move {
        while value.changed().await.is_ok() {
            if let Some(snapshot) = value.latest() {
                essentials.replace(snapshot);
            }
        }
        debug!("essentials sync stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::store::Store;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_attached_until_signed_in() {
        let store = Store::new();
        let hub = EventHub::new();
        let bridge = RealtimeBridge::new(hub.clone(), store.auth().subscribe());

        let value = bridge.channel_value::<u32>("counter");
        settle().await;
        assert_eq!(hub.listener_count("counter"), 0);
        assert_eq!(hub.publish("counter", &json!(5)), 0);
        assert_eq!(value.latest(), None);

        store.auth().sign_in();
        settle().await;
        assert_eq!(hub.listener_count("counter"), 1);
        hub.publish("counter", &json!(7));
        assert_eq!(value.latest(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_detaches_and_keeps_last_value() {
        let store = Store::new();
        store.auth().sign_in();
        let hub = EventHub::new();
        let bridge = RealtimeBridge::new(hub.clone(), store.auth().subscribe());

        let value = bridge.channel_value::<u32>("counter");
        settle().await;
        hub.publish("counter", &json!(1));

        store.auth().sign_out();
        settle().await;
        assert_eq!(hub.listener_count("counter"), 0);
        hub.publish("counter", &json!(2));
        assert_eq!(value.latest(), Some(1));

        store.auth().sign_in();
        settle().await;
        hub.publish("counter", &json!(3));
        assert_eq!(value.latest(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_payload_keeps_previous() {
        let store = Store::new();
        store.auth().sign_in();
        let hub = EventHub::new();
        let bridge = RealtimeBridge::new(hub.clone(), store.auth().subscribe());

        let value = bridge.channel_value::<u32>("counter");
        settle().await;
        hub.publish("counter", &json!(4));
        hub.publish("counter", &json!("not a number"));
        assert_eq!(value.latest(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_detaches() {
        let store = Store::new();
        store.auth().sign_in();
        let hub = EventHub::new();
        let bridge = RealtimeBridge::new(hub.clone(), store.auth().subscribe());

        let value = bridge.channel_value::<u32>("counter");
        settle().await;
        assert_eq!(hub.listener_count("counter"), 1);

        drop(value);
        settle().await;
        assert_eq!(hub.listener_count("counter"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_essentials_into_store() {
        let store = Store::new();
        store.auth().sign_in();
        let hub = EventHub::new();
        let bridge = RealtimeBridge::new(hub.clone(), store.auth().subscribe());

        let sync = sync_essentials(&bridge, store.essentials().clone());
        settle().await;
        hub.publish(
            APP_ESSENTIALS_EVENT,
            &json!({ "unread_notifications": 2, "unread_api_errors": 5 }),
        );
        settle().await;

        let essentials = store.essentials().get().unwrap();
        assert_eq!(essentials.unread_notifications, 2);
        assert_eq!(essentials.unread_api_errors, 5);
        assert_eq!(essentials.market_state, None);

        sync.abort();
        settle().await;
        assert_eq!(hub.listener_count(APP_ESSENTIALS_EVENT), 0);
    }
}
