//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default backend HTTP endpoint for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:5075";

/// Default realtime endpoint for local development.
pub const DEFAULT_WS_URL: &str = "ws://localhost:5075/realtime";

/// Records requested per page by list screens.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Interval between refetches for polled resources.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Exit animation length of dialogs; unmount waits this long after close.
pub const DIALOG_EXIT_DELAY: Duration = Duration::from_millis(250);

/// Age after which the cached database summary is refetched.
pub const DATABASE_SUMMARY_REVALIDATE: Duration = Duration::from_secs(300);

/// Realtime event carrying [`AppEssentials`](balancer_types::AppEssentials).
pub const APP_ESSENTIALS_EVENT: &str = "compact_app_essentials";

/// Realtime reconnect backoff bounds.
pub const WS_RECONNECT_BASE: Duration = Duration::from_millis(500);
pub const WS_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Timeout for a single HTTP request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
