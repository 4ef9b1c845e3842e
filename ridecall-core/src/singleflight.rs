//! Per-key coalescing of in-flight resource creation.
//!
//! Wraps the `async_singleflight` crate: when several tasks race to create
//! the same engine resource (the same ride's routing context, the same
//! participant's transport), only one creation future runs; the others
//! wait for its result. This is what turns the registry's check-then-create
//! into an atomic get-or-create across engine-call suspension points.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Coalesces concurrent creation attempts for the same key.
///
/// Values must be `Clone` (the leader's result is handed to every waiter);
/// in practice they are `Arc`-wrapped engine handles. Errors are shared the
/// same way, which is why [`Error`] is `Clone`.
pub struct CreationGuard<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<K, V, Error>>,
}

impl<K, V> CreationGuard<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Run `create` for `key`, unless a creation for the same key is
    /// already in flight, in which case wait for that one's result.
    ///
    /// `Group::work` returns `Result<V, Option<E>>`:
    ///   `Ok(v)`        => success
    ///   `Err(Some(e))` => the creation future failed
    ///   `Err(None)`    => the leader was dropped (after internal retries)
    pub async fn run<Fut>(&self, key: K, create: Fut) -> Result<V>
    where
        Fut: std::future::Future<Output = Result<V>> + Send,
    {
        self.group.work(&key, create).await.map_err(|err| match err {
            Some(inner) => inner,
            None => Error::Internal("resource creation task dropped before completing".to_string()),
        })
    }
}

impl<K, V> Default for CreationGuard<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for CreationGuard<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            group: Arc::clone(&self.group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_single_caller_runs_once() {
        let guard: CreationGuard<String, i32> = CreationGuard::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let result = guard
            .run("ride-1".to_string(), async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_coalesce() {
        let guard: Arc<CreationGuard<String, i32>> = Arc::new(CreationGuard::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let guard = guard.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .run("same-ride".to_string(), async move {
                        sleep(Duration::from_millis(50)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }

        // Only the leader's creation future ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let guard: CreationGuard<String, i32> = CreationGuard::new();
        let calls = Arc::new(AtomicU32::new(0));

        let c1 = calls.clone();
        let r1 = guard.run("ride-a".to_string(), async move {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        let c2 = calls.clone();
        let r2 = guard.run("ride-b".to_string(), async move {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });

        let (r1, r2) = tokio::join!(r1, r2);
        assert_eq!(r1.unwrap(), 1);
        assert_eq!(r2.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_propagates_and_key_recovers() {
        let guard: CreationGuard<String, i32> = CreationGuard::new();

        let result = guard
            .run("ride-1".to_string(), async {
                Err(Error::RouterCreationFailed("worker refused".to_string()))
            })
            .await;
        assert!(matches!(result, Err(Error::RouterCreationFailed(_))));

        // A failed creation must not wedge the key.
        let result = guard.run("ride-1".to_string(), async { Ok(9) }).await;
        assert_eq!(result.unwrap(), 9);
    }
}
