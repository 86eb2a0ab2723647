//! Shared subscription payload

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Latest base64 subscription payload, readable while bootstrap is running
///
/// Starts empty. Readers never block and never see a half-written value;
/// a `publish` replaces the whole payload at once.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionCache {
    inner: Arc<ArcSwap<String>>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the payload; readers observe the new value immediately
    pub fn publish(&self, payload: impl Into<String>) {
        self.inner.store(Arc::new(payload.into()));
    }

    /// Current payload, empty until the first publish
    pub fn snapshot(&self) -> Arc<String> {
        self.inner.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let cache = SubscriptionCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.snapshot().as_str(), "");
    }

    #[test]
    fn test_publish_is_visible_through_clones() {
        let cache = SubscriptionCache::new();
        let reader = cache.clone();

        cache.publish("Zmlyc3Q=");
        assert_eq!(reader.snapshot().as_str(), "Zmlyc3Q=");

        cache.publish(String::from("c2Vjb25k"));
        assert_eq!(reader.snapshot().as_str(), "c2Vjb25k");
    }

    #[test]
    fn test_old_snapshot_survives_publish() {
        let cache = SubscriptionCache::new();
        cache.publish("old");
        let held = cache.snapshot();

        cache.publish("new");
        assert_eq!(held.as_str(), "old");
        assert_eq!(cache.snapshot().as_str(), "new");
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_values() {
        let cache = SubscriptionCache::new();
        let payloads: Vec<String> = (0..50).map(|i| format!("payload-{:03}", i)).collect();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let known = payloads.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let seen = cache.snapshot();
                    assert!(seen.is_empty() || known.contains(&seen));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for payload in &payloads {
            cache.publish(payload.clone());
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.snapshot().as_str(), "payload-049");
    }
}
