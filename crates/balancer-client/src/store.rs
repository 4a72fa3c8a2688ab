//! Global UI state, split into independent slices.
//!
//! Each slice owns a `watch` channel: readers take a snapshot or subscribe,
//! actions replace the value. Slices never reach into each other; anything
//! that spans two of them (like the essentials sync, which is gated on
//! auth) lives outside the store and talks to both through their handles.
//!
//! ```text
//! Store
//! ├── auth        bool
//! ├── dialogs     confirmation, register_ip, trade_details,
//! │               api_error_details, strategy_config
//! └── essentials  Option<AppEssentials>
//! ```

use std::sync::Arc;

use balancer_types::{ApiErrorRecord, AppEssentials, Trade};
use tokio::sync::watch;
use tracing::{debug, info};

// ============================================================================
// Auth
// ============================================================================

#[derive(Clone)]
pub struct AuthSlice {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AuthSlice {
    fn default() -> Self {
        Self { tx: Arc::new(watch::channel(false).0) }
    }
}

impl AuthSlice {
    pub fn is_authenticated(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn sign_in(&self) {
        if !self.tx.send_replace(true) {
            info!("signed in");
        }
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(false) {
            info!("signed out");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Dialogs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DialogKind {
    Confirmation,
    RegisterIp,
    TradeDetails,
    ApiErrorDetails,
    StrategyConfig,
}

/// What a confirmation dialog asks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPayload {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
}

impl ConfirmationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { title: title.into(), message: message.into(), confirm_label: "Confirm".into() }
    }
}

/// Visibility plus the payload of the most recent open.
///
/// Closing keeps the payload so an exit transition can still render it;
/// the next open replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogState<T> {
    pub is_open: bool,
    pub payload: Option<T>,
}

impl<T> Default for DialogState<T> {
    fn default() -> Self {
        Self { is_open: false, payload: None }
    }
}

pub struct DialogSlice<T> {
    kind: DialogKind,
    tx: Arc<watch::Sender<DialogState<T>>>,
}

impl<T> Clone for DialogSlice<T> {
    fn clone(&self) -> Self {
        Self { kind: self.kind, tx: Arc::clone(&self.tx) }
    }
}

impl<T: Clone> DialogSlice<T> {
    pub fn new(kind: DialogKind) -> Self {
        Self { kind, tx: Arc::new(watch::channel(DialogState::default()).0) }
    }

    pub fn kind(&self) -> DialogKind {
        self.kind
    }

    pub fn open(&self, payload: T) {
        self.tx.send_replace(DialogState { is_open: true, payload: Some(payload) });
        debug!(dialog = %self.kind, "opened");
    }

    pub fn close(&self) {
        let closed = self.tx.send_if_modified(|state| std::mem::replace(&mut state.is_open, false));
        if closed {
            debug!(dialog = %self.kind, "closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().is_open
    }

    pub fn payload(&self) -> Option<T> {
        self.tx.borrow().payload.clone()
    }

    pub fn state(&self) -> DialogState<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogState<T>> {
        self.tx.subscribe()
    }
}

#[derive(Clone)]
pub struct DialogSlices {
    pub confirmation: DialogSlice<ConfirmationPayload>,
    pub register_ip: DialogSlice<()>,
    pub trade_details: DialogSlice<Trade>,
    pub api_error_details: DialogSlice<ApiErrorRecord>,
    /// Payload is the symbol being configured.
    pub strategy_config: DialogSlice<String>,
}

impl Default for DialogSlices {
    fn default() -> Self {
        Self {
            confirmation: DialogSlice::new(DialogKind::Confirmation),
            register_ip: DialogSlice::new(DialogKind::RegisterIp),
            trade_details: DialogSlice::new(DialogKind::TradeDetails),
            api_error_details: DialogSlice::new(DialogKind::ApiErrorDetails),
            strategy_config: DialogSlice::new(DialogKind::StrategyConfig),
        }
    }
}

impl DialogSlices {
    pub fn close_all(&self) {
        self.confirmation.close();
        self.register_ip.close();
        self.trade_details.close();
        self.api_error_details.close();
        self.strategy_config.close();
    }
}

// ============================================================================
// Essentials
// ============================================================================

/// Latest [`AppEssentials`] snapshot; `None` until the first push.
#[derive(Clone)]
pub struct EssentialsSlice {
    tx: Arc<watch::Sender<Option<AppEssentials>>>,
}

impl Default for EssentialsSlice {
    fn default() -> Self {
        Self { tx: Arc::new(watch::channel(None).0) }
    }
}

impl EssentialsSlice {
    pub fn get(&self) -> Option<AppEssentials> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, essentials: AppEssentials) {
        self.tx.send_replace(Some(essentials));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AppEssentials>> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone, Default)]
pub struct Store {
    auth: AuthSlice,
    dialogs: DialogSlices,
    essentials: EssentialsSlice,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth(&self) -> &AuthSlice {
        &self.auth
    }

    pub fn dialogs(&self) -> &DialogSlices {
        &self.dialogs
    }

    pub fn essentials(&self) -> &EssentialsSlice {
        &self.essentials
    }
}
