//! Lazy mount/unmount for dialogs with exit transitions.
//!
//! A dialog's heavy content is created on first open and released only
//! after it has been closed for the exit delay, so the close animation can
//! still render it.
//!
//! ```text
//!            open                request_close
//!   Closed ────────▶ Open ───────────────────────▶ Closing
//!     ▲               ▲                              │ │
//!     │               └───────────── open ───────────┘ │
//!     └──────────────── exit delay elapsed ────────────┘
//!                        (on_unmount runs)
//! ```
//!
//! Repeated `request_close` calls while closing do not restart the timer.
//! Dropping the coordinator cancels a pending unmount without running the
//! callback.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::constants::DIALOG_EXIT_DELAY;
use crate::store::DialogState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DialogPhase {
    Closed,
    Open,
    Closing,
}

struct LazyInner {
    phase: DialogPhase,
    timer: Option<JoinHandle<()>>,
}

pub struct LazyDialog {
    name: &'static str,
    delay: Duration,
    inner: Arc<Mutex<LazyInner>>,
    on_unmount: Arc<dyn Fn() + Send + Sync>,
}

impl LazyDialog {
    pub fn new(name: &'static str, on_unmount: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_delay(name, DIALOG_EXIT_DELAY, on_unmount)
    }

    /// Use the exit delay configured in `dialog_exit_delay_ms`.
    pub fn from_config(
        name: &'static str,
        config: &ClientConfig,
        on_unmount: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::with_delay(name, config.dialog_exit_delay(), on_unmount)
    }

    pub fn with_delay(
        name: &'static str,
        delay: Duration,
        on_unmount: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            delay,
            inner: Arc::new(Mutex::new(LazyInner { phase: DialogPhase::Closed, timer: None })),
            on_unmount: Arc::new(on_unmount),
        }
    }

    pub fn phase(&self) -> DialogPhase {
        self.inner.lock().phase
    }

    /// Content exists (open or animating out).
    pub fn is_mounted(&self) -> bool {
        self.phase() != DialogPhase::Closed
    }

    pub fn is_visible(&self) -> bool {
        self.phase() == DialogPhase::Open
    }

    pub fn open(&self) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
            trace!(dialog = self.name, "pending unmount cancelled");
        }
        if inner.phase != DialogPhase::Open {
            debug!(dialog = self.name, from = %inner.phase, "open");
            inner.phase = DialogPhase::Open;
        }
    }

    /// Start the exit transition. Must be called inside a tokio runtime.
    pub fn request_close(&self) {
        let mut inner = self.inner.lock();
        if inner.phase != DialogPhase::Open {
            return;
        }
        inner.phase = DialogPhase::Closing;
        debug!(dialog = self.name, delay = ?self.delay, "closing");

        let shared = Arc::clone(&self.inner);
        let on_unmount = Arc::clone(&self.on_unmount);
        let delay = self.delay;
        let name = self.name;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = shared.lock();
                if inner.phase != DialogPhase::Closing {
                    return;
                }
                inner.phase = DialogPhase::Closed;
                inner.timer = None;
            }
            debug!(dialog = name, "unmounted");
            on_unmount();
        }));
    }

    /// Drive this coordinator from a dialog slice's open flag.
    pub fn follow<T>(self, mut state: watch::Receiver<DialogState<T>>) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
    {
        tokio::spawn(async move {
            loop {
                let is_open = state.borrow_and_update().is_open;
                if is_open {
                    self.open();
                } else {
                    self.request_close();
                }
                if state.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for LazyDialog {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}
