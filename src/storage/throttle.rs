use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default minimum interval between two accepted requests for the same key.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(5000);

/// Default number of keys tracked before the least recently seen is dropped.
pub const DEFAULT_THROTTLE_CAPACITY: usize = 10_000;

/// A request arrived for a key that was already accepted inside the window.
#[derive(Debug, Clone, Error)]
#[error("too many requests for this URL, retry in {}ms", retry_after.as_millis())]
pub struct Throttled {
    /// Time left until the key's window closes
    pub retry_after: Duration,
}

/// Per-key admission gate checked before any pipeline work.
///
/// Implementations must record the admission time for every accepted key,
/// regardless of how the request later ends.
pub trait RequestGate: Send + Sync {
    /// Rejects the key if it was accepted less than one window ago;
    /// otherwise records `now` for the key and admits it.
    fn check_and_record(&self, key: &str) -> Result<(), Throttled>;
}

/// In-memory throttle keyed on the raw request URL.
///
/// Records live in an LRU ordered by admission time, so the least recently
/// used entry is always the oldest record. Records older than the window are
/// dropped as new keys come in, which keeps the map at roughly the number of
/// keys seen during the last window (hard-capped by `capacity`).
pub struct ThrottleGuard {
    window: Duration,
    records: Mutex<LruCache<String, Instant>>,
}

impl ThrottleGuard {
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            window,
            records: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// [`RequestGate::check_and_record`] against an explicit clock reading.
    pub fn check_and_record_at(&self, key: &str, now: Instant) -> Result<(), Throttled> {
        let mut records = self.lock();

        if let Some(last) = records.peek(key) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                return Err(Throttled {
                    retry_after: self.window - elapsed,
                });
            }
        }

        records.put(key.to_owned(), now);
        Self::prune(&mut records, now, self.window);
        Ok(())
    }

    /// Pops records whose window has already closed, oldest first.
    fn prune(records: &mut LruCache<String, Instant>, now: Instant, window: Duration) {
        while let Some((_, oldest)) = records.peek_lru() {
            if now.saturating_duration_since(*oldest) < window {
                break;
            }
            records.pop_lru();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Instant>> {
        // A panic while holding the lock cannot leave the LRU half-updated in a
        // way that matters for throttling, so recover the guard.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ThrottleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW, DEFAULT_THROTTLE_CAPACITY)
    }
}

impl RequestGate for ThrottleGuard {
    fn check_and_record(&self, key: &str) -> Result<(), Throttled> {
        self.check_and_record_at(key, Instant::now())
    }
}
