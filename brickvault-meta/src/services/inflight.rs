//! In-flight request coalescing
//!
//! Concurrent lookups for the same key share one upstream call: the first
//! caller's future is stored as a [`Shared`] future and later callers await
//! a clone of it. The entry is removed by whichever waiter sees it finish.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct InFlight<T: Clone> {
    pending: Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Await the in-flight call for `key`, or start one with `start`
    pub async fn run<F>(&self, key: &str, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let future = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "Joining in-flight lookup");
                    existing.clone()
                }
                None => {
                    let shared = start().shared();
                    pending.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        let output = future.clone().await;

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.get(key).is_some_and(|current| current.ptr_eq(&future)) {
            pending.remove(key);
        }

        output
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let inflight = InFlight::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || {
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    calls.fetch_add(1, Ordering::SeqCst) + 1
                }
                .boxed()
            }
        };

        let (a, b, c) = tokio::join!(
            inflight.run("3001", make(calls.clone())),
            inflight.run("3001", make(calls.clone())),
            inflight.run("3001", make(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a, b, c), (1, 1, 1));
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_calls_are_not_coalesced() {
        let inflight = InFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            inflight
                .run("3001", move || {
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        7
                    }
                    .boxed()
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let inflight = InFlight::<&'static str>::new();
        let (a, b) = tokio::join!(
            inflight.run("a", || async { "a" }.boxed()),
            inflight.run("b", || async { "b" }.boxed()),
        );
        assert_eq!((a, b), ("a", "b"));
    }
}
