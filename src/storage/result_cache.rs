use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lifetime of a cached feed document (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default number of documents kept before the least recently used is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Store of finished feed documents keyed on the raw request URL.
///
/// Only successful results are ever stored; there is no negative caching.
pub trait FeedCache: Send + Sync {
    /// Returns the document if one was stored and has not expired.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a document, replacing any existing entry for the key.
    fn put(&self, key: &str, document: String);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    document: String,
    expires_at: Instant,
}

/// Bounded in-memory [`FeedCache`] with a fixed TTL.
///
/// Expiry is checked on read; an expired entry is removed when it is found.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// [`FeedCache::get`] against an explicit clock reading.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.document.clone()),
            Some(_) => {
                tracing::debug!(key = %key, "Cache entry expired, evicting");
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// [`FeedCache::put`] against an explicit clock reading.
    pub fn put_at(&self, key: &str, document: String, now: Instant) {
        let entry = CacheEntry {
            document,
            expires_at: now + self.ttl,
        };
        self.lock().put(key.to_owned(), entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY)
    }
}

impl FeedCache for ResultCache {
    fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    fn put(&self, key: &str, document: String) {
        self.put_at(key, document, Instant::now());
    }
}
