//! Per-client rate limiting with token buckets.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::response::too_many_requests;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::client_ip::ClientKey;

/// A token bucket rate limiter.
///
/// Starts full, refills continuously at `refill_rate` tokens per second up to
/// `capacity`, and spends one token per admitted request.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    pub fn new_at(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Try to take one token. Never waits.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available, or `None` if the bucket never refills.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.tokens >= 1.0 {
            return Some(Duration::ZERO);
        }
        if self.refill_rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        // An earlier `now` than the last refill (racing callers) adds nothing.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Wait before a retry can succeed. Only set on rejection with a non-zero refill rate.
    pub retry_after: Option<Duration>,
}

/// Concurrent map from client key to its own token bucket.
///
/// Buckets are created on first sight of a key and live for the lifetime of
/// the limiter. A shard lock is only held long enough to clone the bucket
/// handle out, never while a bucket is locked, so unrelated clients do not
/// contend.
#[derive(Debug)]
pub struct KeyedLimiter {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
    refill_rate: f64,
    burst: u32,
}

impl KeyedLimiter {
    pub fn new(refill_rate: f64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            refill_rate,
            burst,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst)
    }

    /// Spend one token from `key`'s bucket, creating the bucket if needed.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let bucket = self.bucket(key, now);
        Self::acquire(&bucket, now)
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        if let Some(existing) = self.buckets.get(key).map(|entry| Arc::clone(entry.value())) {
            return existing;
        }

        // Insert-if-absent under the shard write lock; a racing creator's
        // bucket wins and this closure never runs.
        self.buckets
            .entry(key.to_owned())
            .or_insert_with(|| {
                metrics::record_client_tracked();
                Arc::new(Mutex::new(TokenBucket::new_at(self.burst, self.refill_rate, now)))
            })
            .value()
            .clone()
    }

    fn acquire(bucket: &Mutex<TokenBucket>, now: Instant) -> Decision {
        let mut bucket = lock(bucket);
        let allowed = bucket.try_acquire_at(now);
        Decision {
            allowed,
            retry_after: if allowed { None } else { bucket.retry_after() },
        }
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// `try_acquire_at` cannot panic part-way, so a poisoned bucket is still consistent.
fn lock(bucket: &Mutex<TokenBucket>) -> MutexGuard<'_, TokenBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate-limit stage: rejects with 429 once a client's bucket is empty.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let key = request
        .extensions()
        .get::<ClientKey>()
        .cloned()
        .unwrap_or_else(|| state.proxies.client_key(&request));

    let decision = state.limiter.check(key.as_str());
    if decision.allowed {
        return next.run(request).await;
    }

    tracing::warn!(client = %key, retry_after = ?decision.retry_after, "Rate limit exceeded");
    metrics::record_rate_limited();
    too_many_requests(decision.retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_burst_then_reject() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(3, 1.0, start);

        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_refill_after_one_interval() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(2, 4.0, start);
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));

        // 4 tokens/s: 200ms yields 0.8 tokens, not enough.
        assert!(!bucket.try_acquire_at(start + Duration::from_millis(200)));
        // Fractional accrual carries over: 0.8 + 0.4 = 1.2.
        assert!(bucket.try_acquire_at(start + Duration::from_millis(300)));
        assert!(!bucket.try_acquire_at(start + Duration::from_millis(300)));
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(2, 100.0, start);
        assert!(bucket.try_acquire_at(start));

        let later = start + Duration::from_secs(60);
        assert!(bucket.try_acquire_at(later));
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
        assert!(bucket.tokens() <= 2.0);
    }

    #[test]
    fn test_time_going_backwards_is_harmless() {
        let start = Instant::now();
        let later = start + Duration::from_secs(1);
        let mut bucket = TokenBucket::new_at(1, 1.0, later);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_after() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(1, 2.0, start);
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));
        assert_eq!(bucket.retry_after(), Some(Duration::from_millis(500)));

        let mut frozen = TokenBucket::new_at(1, 0.0, start);
        assert!(frozen.try_acquire_at(start));
        assert!(!frozen.try_acquire_at(start + Duration::from_secs(3600)));
        assert_eq!(frozen.retry_after(), None);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = KeyedLimiter::new(1.0, 2);
        let now = Instant::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("a", now).allowed);
        let denied = limiter.check_at("a", now);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(1)));

        assert!(limiter.check_at("b", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_allowed_resumes_after_refill() {
        let limiter = KeyedLimiter::new(5.0, 1);
        let now = Instant::now();
        assert!(limiter.check_at("c", now).allowed);
        assert!(!limiter.check_at("c", now + Duration::from_millis(100)).allowed);
        assert!(limiter.check_at("c", now + Duration::from_millis(250)).allowed);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_bucket() {
        const THREADS: usize = 64;
        const BURST: u32 = 10;

        // Zero refill so timing cannot add tokens mid-test.
        let limiter = KeyedLimiter::new(0.0, BURST);
        let barrier = Barrier::new(THREADS);
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    if limiter.allow("10.0.0.1") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(limiter.len(), 1);
        assert_eq!(admitted.load(Ordering::SeqCst), BURST as usize);
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let limiter = KeyedLimiter::new(0.0, 3);
        std::thread::scope(|s| {
            for i in 0..16 {
                let limiter = &limiter;
                s.spawn(move || {
                    let key = format!("client-{i}");
                    for _ in 0..3 {
                        assert!(limiter.allow(&key));
                    }
                    assert!(!limiter.allow(&key));
                });
            }
        });
        assert_eq!(limiter.len(), 16);
    }

    #[test]
    fn test_locked_bucket_does_not_block_new_keys() {
        use std::sync::mpsc;

        let limiter = Arc::new(KeyedLimiter::new(0.0, 3));
        let now = Instant::now();
        let hot = limiter.bucket("hot", now);
        let held = lock(&hot);

        // A request for the hot key waits on its bucket lock.
        let waiter = {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || limiter.check_at("hot", now).allowed)
        };
        std::thread::sleep(Duration::from_millis(50));

        // Enough new keys to land in every shard, including the hot key's.
        let (tx, rx) = mpsc::channel();
        {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                for i in 0..2048 {
                    limiter.check_at(&format!("client-{i}"), now);
                }
                let _ = tx.send(());
            });
        }
        let inserted = rx.recv_timeout(Duration::from_secs(5));

        drop(held);
        assert!(waiter.join().unwrap());
        assert!(inserted.is_ok(), "insert blocked behind a held bucket lock");
        assert_eq!(limiter.len(), 2049);
    }
}
