//! Non-blocking user notifications ("toasts").
//!
//! Orchestrators report recoverable failures here instead of returning them,
//! so a failed fetch never surfaces as an unhandled error. Whatever renders
//! the UI drains the receiver.

use balancer_types::ApiError;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub code: Option<String>,
}

/// Cloneable sending side of the toast queue.
#[derive(Debug, Clone)]
pub struct Toaster {
    tx: mpsc::UnboundedSender<Toast>,
}

impl Toaster {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn show(&self, toast: Toast) {
        // A closed receiver means nothing renders toasts anymore.
        let _ = self.tx.send(toast);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.show(Toast { level: ToastLevel::Info, message: message.into(), code: None });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(Toast { level: ToastLevel::Success, message: message.into(), code: None });
    }

    pub fn error(&self, error: &ApiError) {
        self.show(Toast {
            level: ToastLevel::Error,
            message: error.message.clone(),
            code: error.code.clone(),
        });
    }
}
