//! Per-run lookup memo shared by one enricher instance

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Memoizes one upstream lookup per key
///
/// Concurrent callers for the same key wait on a single lookup. Failed
/// lookups are not cached, so a later caller tries again.
pub struct Memo<V> {
    cells: DashMap<String, Arc<OnceCell<V>>>,
}

impl<V: Clone> Memo<V> {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, key: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cells.entry(key.to_string()).or_default().clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Number of keys with a completed lookup
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for Memo<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_single_lookup_per_key() {
        let memo: Memo<u32> = Memo::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let lookup = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, String>(42)
        };

        let (a, b, c) = tokio::join!(
            memo.get_or_try_init("example.com", lookup),
            memo.get_or_try_init("example.com", lookup),
            memo.get_or_try_init("example.com", lookup),
        );

        assert_eq!((a, b, c), (Ok(42), Ok(42), Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let memo: Memo<u32> = Memo::new();

        let first = memo
            .get_or_try_init("k", || async { Err::<u32, _>("down") })
            .await;
        assert_eq!(first, Err("down"));
        assert!(memo.is_empty());

        let second = memo.get_or_try_init("k", || async { Ok::<_, &str>(7) }).await;
        assert_eq!(second, Ok(7));
    }
}
