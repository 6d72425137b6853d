//! Reactive in-memory cache
//!
//! A keyed store whose entries can be observed. The whole map is replaced on
//! every write (copy-on-write behind an `Arc`), so readers only ever see
//! complete snapshots and concurrent writers need no extra locking. The last
//! write for a key wins. Entries are never evicted.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;

pub struct ReactiveCache<K, T> {
    entries: watch::Sender<Arc<HashMap<K, T>>>,
}

impl<K, T> Default for ReactiveCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> ReactiveCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (entries, _) = watch::channel(Arc::new(HashMap::new()));
        Self { entries }
    }

    /// Current value for `key`, without side effects
    pub fn peek(&self, key: &K) -> Option<T> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn put(&self, key: K, value: T) {
        self.entries.send_modify(|entries| {
            let mut next = HashMap::clone(entries);
            next.insert(key, value);
            *entries = Arc::new(next);
        });
    }

    pub fn put_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = (K, T)>,
    {
        self.entries.send_modify(|entries| {
            let mut next = HashMap::clone(entries);
            next.extend(values);
            *entries = Arc::new(next);
        });
    }

    /// Values of `key`, emitted whenever they change
    ///
    /// The stream is lazy and restartable: every call observes independently.
    /// It stays silent until the key has been written at least once, and
    /// never emits the same value twice in a row.
    pub fn observe(&self, key: K) -> BoxStream<'static, T> {
        let receiver = self.entries.subscribe();
        stream::unfold(
            (receiver, key, None::<T>, true),
            |(mut receiver, key, last, first)| async move {
                let mut first = first;
                loop {
                    if !first {
                        receiver.changed().await.ok()?;
                    }
                    first = false;

                    let current = receiver.borrow_and_update().get(&key).cloned();
                    if let Some(value) = current {
                        if last.as_ref() != Some(&value) {
                            return Some((value.clone(), (receiver, key, Some(value), false)));
                        }
                    }
                }
            },
        )
        .boxed()
    }

    /// Complete snapshot of the cache
    pub fn snapshot(&self) -> Arc<HashMap<K, T>> {
        Arc::clone(&self.entries.borrow())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_put_then_peek() {
        let cache = ReactiveCache::new();
        assert_eq!(cache.peek(&"mojito"), None);

        cache.put("mojito", 1);
        assert_eq!(cache.peek(&"mojito"), Some(1));

        cache.put("mojito", 2);
        assert_eq!(cache.peek(&"mojito"), Some(2));
    }

    #[test]
    fn test_put_all_and_snapshot() {
        let cache = ReactiveCache::new();
        cache.put_all(vec![("a", 1), ("b", 2)]);
        let before = cache.snapshot();

        cache.put("c", 3);
        assert_eq!(before.len(), 2);
        assert_eq!(cache.len(), 3);
        assert!(!cache.is_empty());
    }

    #[tokio::test]
    async fn test_observe_silent_until_first_put() {
        let cache: ReactiveCache<&str, i32> = ReactiveCache::new();
        let mut values = cache.observe("negroni");

        cache.put("other", 1);
        assert!(timeout(Duration::from_millis(50), values.next()).await.is_err());

        cache.put("negroni", 7);
        assert_eq!(timeout(Duration::from_secs(1), values.next()).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_observe_is_distinct_until_changed() {
        let cache = ReactiveCache::new();
        let mut values = cache.observe("gimlet");

        cache.put("gimlet", 1);
        assert_eq!(timeout(Duration::from_secs(1), values.next()).await.unwrap(), Some(1));

        cache.put("gimlet", 1);
        cache.put("unrelated", 9);
        assert!(timeout(Duration::from_millis(50), values.next()).await.is_err());

        cache.put("gimlet", 2);
        assert_eq!(timeout(Duration::from_secs(1), values.next()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_observe_starts_from_current_value() {
        let cache = ReactiveCache::new();
        cache.put("sazerac", "rye".to_string());

        let first: Vec<String> = cache.observe("sazerac").take(1).collect().await;
        let again: Vec<String> = cache.observe("sazerac").take(1).collect().await;
        assert_eq!(first, vec!["rye".to_string()]);
        assert_eq!(again, first);
    }
}
