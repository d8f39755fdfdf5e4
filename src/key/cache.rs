use crate::error::Result;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Cache key: the owning access token plus the key within that token's scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    token: String,
    key: String,
}

impl CacheKey {
    fn new(token: &str, key: &str) -> Self {
        Self {
            token: token.to_string(),
            key: key.to_string(),
        }
    }
}

/// Entry in the cache.
///
/// The value is filled at most once; every caller that finds the entry
/// while the value is being produced waits for that single producer.
struct CacheEntry<V> {
    /// Time when this entry was created
    created: Instant,

    /// Lifetime requested by the lookup that created this entry
    lifetime: Duration,

    /// The cached value
    value: OnceCell<V>,
}

impl<V> CacheEntry<V> {
    fn new(created: Instant, lifetime: Duration) -> Self {
        Self {
            created,
            lifetime,
            value: OnceCell::new(),
        }
    }

    /// Dead once `now - created > lifetime`
    fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.created) > lifetime
    }
}

/// Concurrent cache with per-lookup expiration, scoped by access token.
///
/// A lookup that finds a live entry returns a clone of its value. A lookup that
/// finds no entry, or an expired one, installs a fresh entry and runs the
/// initializer exactly once for all concurrent lookups of the same key.
pub struct TokenCache<V> {
    /// Name used in logs and metrics
    name: &'static str,

    entries: Mutex<HashMap<CacheKey, Arc<CacheEntry<V>>>>,
}

impl<V> std::fmt::Debug for TokenCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("name", &self.name)
            .field("entries_len", &self.entries.lock().len())
            .finish()
    }
}

impl<V> TokenCache<V>
where
    V: Clone + Send + Sync,
{
    /// Creates an empty cache
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Gets a live value from the cache or produces it with `init`.
    ///
    /// If `init` fails the entry is dropped so the next lookup retries.
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        token: &str,
        key: &str,
        lifetime: Duration,
        init: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cache_key = CacheKey::new(token, key);
        let entry = self.entry_for(&cache_key, lifetime);

        match entry.value.get_or_try_init(init).await {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                let mut entries = self.entries.lock();
                if entries
                    .get(&cache_key)
                    .is_some_and(|current| Arc::ptr_eq(current, &entry))
                {
                    entries.remove(&cache_key);
                }
                Err(e)
            }
        }
    }

    fn entry_for(&self, cache_key: &CacheKey, lifetime: Duration) -> Arc<CacheEntry<V>> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(entry) = entries.get(cache_key) {
            if !entry.is_expired(now, lifetime) {
                counter!("fileencryption.cache.hit", 1, "cache" => self.name);
                return Arc::clone(entry);
            }
            log::debug!("{} stale -- key: {}", self.name, cache_key.key);
        }

        counter!("fileencryption.cache.miss", 1, "cache" => self.name);

        // Expired entries are only swept on a miss, each against its own lifetime
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now, e.lifetime));
        if entries.len() != before {
            log::debug!(
                "{} evicted {} expired entries",
                self.name,
                before - entries.len()
            );
        }

        let entry = Arc::new(CacheEntry::new(now, lifetime));
        entries.insert(cache_key.clone(), Arc::clone(&entry));
        log::debug!("{} write -> key: {}", self.name, cache_key.key);
        entry
    }

    /// Removes every entry owned by the given access token
    pub fn remove_token(&self, token: &str) {
        let mut entries = self.entries.lock();
        entries.retain(|k, _| k.token != token);
    }

    /// Removes all entries
    pub fn clear(&self) {
        log::debug!("{} clear", self.name);
        self.entries.lock().clear();
    }

    /// Number of entries, including ones that have expired but were not swept yet
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
