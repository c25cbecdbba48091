//! Log throttling utility
//!
//! Limits how often the same kind of message is recorded, so a stream that
//! fails on every frame does not flood the log.

use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Log throttler keyed by message kind
///
/// ```rust
/// use hwdec_pipeline::utils::LogThrottler;
///
/// let throttler: LogThrottler = LogThrottler::with_secs(5);
/// assert!(throttler.should_log("status:-12909"));
/// assert!(!throttler.should_log("status:-12909"));
/// ```
pub struct LogThrottler<K = String> {
    last_logged: RwLock<HashMap<K, Instant>>,
    interval: Duration,
}

impl<K: Eq + Hash> LogThrottler<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if `key` is due, and marks it as logged now
    pub fn should_log<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = Instant::now();
        let due = |last: Option<&Instant>| {
            last.map_or(true, |last| now.duration_since(*last) >= self.interval)
        };

        if !due(self.last_logged.read().get(key)) {
            return false;
        }

        // Another thread may have logged between the two locks
        let mut map = self.last_logged.write();
        if !due(map.get(key)) {
            return false;
        }
        map.insert(key.to_owned(), now);
        true
    }

    /// Forget a key so its next occurrence is logged immediately
    pub fn clear<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.last_logged.write().remove(key);
    }

    pub fn clear_all(&self) {
        self.last_logged.write().clear();
    }

    pub fn len(&self) -> usize {
        self.last_logged.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_logged.read().is_empty()
    }
}

impl<K: Eq + Hash> Default for LogThrottler<K> {
    fn default() -> Self {
        Self::with_secs(5)
    }
}
