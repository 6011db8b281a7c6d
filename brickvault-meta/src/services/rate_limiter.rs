//! Token-bucket throttle for the parts catalog API
//!
//! Capacity is the burst size and tokens refill at `requests_per_second`.
//! Waiters are served strictly in arrival order: the fair `tokio` mutex
//! queues them and only the head of the queue waits on the bucket.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::future::Future;
use std::num::NonZeroU32;
use tokio::sync::Mutex;

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            burst: 5,
        }
    }
}

pub struct RateLimiter {
    bucket: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
    queue: Mutex<()>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);

        Self {
            bucket: GovernorLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            queue: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Wait for one token, in FIFO order with other callers
    pub async fn acquire(&self) {
        let _turn = self.queue.lock().await;
        if self.bucket.check().is_err() {
            tracing::debug!("Catalog rate limit reached, waiting for a token");
            self.bucket.until_ready().await;
        }
    }

    /// Run `task` once a token is available
    ///
    /// Tasks are never dropped; the token is held only until the task
    /// starts, so slow tasks do not block the queue.
    pub async fn enqueue<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        task().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_burst_is_immediate_then_throttled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 2,
            burst: 3,
        });

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_tasks_run_in_arrival_order() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 100,
            burst: 1,
        });
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tasks = (0..5).map(|i| {
            let order = order.clone();
            let limiter = &limiter;
            async move {
                limiter
                    .enqueue(|| async move {
                        order.lock().unwrap().push(i);
                    })
                    .await
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_enqueue_returns_task_output() {
        let limiter = RateLimiter::default();
        let value = limiter.enqueue(|| async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(limiter.config().burst, 5);
    }
}
