//! Fixed-window request limiting per client.
//!
//! Each client gets a bucket that counts admitted requests since its window
//! started. Once a full window has elapsed the bucket starts over.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBucket {
    pub window_start: Instant,
    pub count: u64,
}

/// Atomic check-and-increment of per-key window counters.
pub trait WindowCounterStore: Send + Sync {
    /// Admits and counts the request iff the key's current window holds
    /// fewer than `limit` requests. Rejections are not counted.
    fn try_acquire(&self, key: &str, now: Instant, window: Duration, limit: u64) -> bool;

    /// Drops buckets whose window has fully elapsed. Returns how many.
    fn purge_expired(&self, now: Instant, window: Duration) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, key: &str) -> Option<RateLimitBucket> {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expired(bucket: &RateLimitBucket, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(bucket.window_start) >= window
}

impl WindowCounterStore for InMemoryCounterStore {
    fn try_acquire(&self, key: &str, now: Instant, window: Duration, limit: u64) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(key.to_string()).or_insert(RateLimitBucket {
            window_start: now,
            count: 0,
        });
        if expired(bucket, now, window) {
            *bucket = RateLimitBucket {
                window_start: now,
                count: 0,
            };
        }
        if bucket.count < limit {
            bucket.count += 1;
            true
        } else {
            false
        }
    }

    fn purge_expired(&self, now: Instant, window: Duration) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| !expired(bucket, now, window));
        before - buckets.len()
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowCounterStore>,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowCounterStore>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    /// Hourly limiter backed by the in-process store.
    pub fn per_hour(limit: u64) -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), limit, DEFAULT_WINDOW)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn allow(&self, client_key: &str) -> bool {
        self.allow_at(client_key, Instant::now())
    }

    pub fn allow_at(&self, client_key: &str, now: Instant) -> bool {
        let allowed = self
            .store
            .try_acquire(client_key, now, self.window, self.limit);
        if !allowed {
            tracing::warn!(client_key = %client_key, limit = self.limit, "Rate limit exceeded");
        }
        allowed
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(Instant::now(), self.window)
    }

    /// Periodically drops stale buckets until the runtime shuts down.
    pub fn spawn_purge_task(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = limiter.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired rate limit buckets", purged);
                }
            }
        })
    }
}
