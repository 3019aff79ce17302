use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

/// Process-lifetime memo for remote objects that do not change during a run.
///
/// Lookups take `&mut self`; callers sharing one cache between runs wrap it in a lock.
#[derive(Debug)]
pub struct RefCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V: Clone> RefCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the memoized value for `key`, calling `fetch` only on the first request.
    ///
    /// Errors are not memoized; a later call with the same key fetches again.
    pub async fn get_or_fetch<F, Fut, E>(&mut self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.clone());
        }

        let value = fetch().await?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for RefCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fetches_once_per_key() {
        let calls = AtomicUsize::new(0);
        let mut cache: RefCache<String, String> = RefCache::new();

        let mut values = Vec::new();
        for _ in 0..5 {
            let value = cache
                .get_or_fetch("author-1".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>("Oda".to_string())
                })
                .await
                .unwrap();
            values.push(value);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| v == "Oda"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_separately() {
        let calls = AtomicUsize::new(0);
        let mut cache: RefCache<u32, u32> = RefCache::new();

        for key in [1, 2, 1, 3, 2] {
            let value = cache
                .get_or_fetch(key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(key * 10)
                })
                .await
                .unwrap();
            assert_eq!(value, key * 10);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_errors_are_not_memoized() {
        let mut cache: RefCache<&str, u32> = RefCache::new();

        let first = cache
            .get_or_fetch("group", || async { Err::<u32, _>("503") })
            .await;
        assert_eq!(first, Err("503"));
        assert!(cache.get(&"group").is_none());

        let second = cache
            .get_or_fetch("group", || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(cache.get(&"group"), Some(&7));
    }
}
