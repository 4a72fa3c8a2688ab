//! Time-bounded single-value cache.
//!
//! Used for endpoints that are expensive and change slowly (the database
//! summary). A value younger than `max_age` is served without fetching;
//! an older one is refetched on the next read. A failed refetch leaves the
//! stale value in place for [`RevalidatingCache::peek`].

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

pub struct RevalidatingCache<T> {
    max_age: Duration,
    entry: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> RevalidatingCache<T> {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, entry: Mutex::new(None) }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// The cached value if it is still fresh.
    pub fn get(&self) -> Option<T> {
        let entry = self.entry.lock();
        entry
            .as_ref()
            .filter(|(stored, _)| stored.elapsed() < self.max_age)
            .map(|(_, value)| value.clone())
    }

    /// The cached value regardless of age.
    pub fn peek(&self) -> Option<T> {
        self.entry.lock().as_ref().map(|(_, value)| value.clone())
    }

    pub fn insert(&self, value: T) {
        *self.entry.lock() = Some((Instant::now(), value));
    }

    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }

    /// Serve a fresh value or run `fetch` and cache its success.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            trace!("cache hit");
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(value.clone());
        Ok(value)
    }
}
