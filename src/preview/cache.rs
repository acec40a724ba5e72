use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use tracing::debug;

/// What is known about a resolved URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Content(String),
    Failed(String),
}

enum Store {
    Unbounded(HashMap<String, CacheEntry>),
    Bounded(LruCache<String, CacheEntry>),
}

impl Store {
    fn get(&mut self, url: &str) -> Option<&CacheEntry> {
        match self {
            Store::Unbounded(map) => map.get(url),
            Store::Bounded(lru) => lru.get(url),
        }
    }

    fn put(&mut self, url: String, entry: CacheEntry) {
        match self {
            Store::Unbounded(map) => {
                map.insert(url, entry);
            }
            Store::Bounded(lru) => {
                if let Some((evicted, _)) = lru.push(url.clone(), entry) {
                    if evicted != url {
                        debug!("Evicted {} from content cache", evicted);
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Store::Unbounded(map) => map.len(),
            Store::Bounded(lru) => lru.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            Store::Unbounded(map) => map.clear(),
            Store::Bounded(lru) => lru.clear(),
        }
    }
}

/// Fetched file contents and fetch failures keyed by resolved URL.
///
/// Create one per application and share it behind an `Arc`. The cache does not
/// deduplicate concurrent fetches of the same URL.
pub struct ContentCache {
    store: Mutex<Store>,
    capacity: Option<NonZeroUsize>,
}

impl ContentCache {
    /// Entries live until the cache is dropped or cleared.
    pub fn unbounded() -> Self {
        Self {
            store: Mutex::new(Store::Unbounded(HashMap::new())),
            capacity: None,
        }
    }

    /// Keep at most `capacity` entries, evicting the least recently used.
    /// A capacity of zero means unbounded.
    pub fn bounded(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self {
                store: Mutex::new(Store::Bounded(LruCache::new(cap))),
                capacity: Some(cap),
            },
            None => Self::unbounded(),
        }
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(cap) => Self::bounded(cap),
            None => Self::unbounded(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.lock().get(url).cloned()
    }

    #[allow(dead_code)]
    pub fn get(&self, url: &str) -> Option<String> {
        match self.lock().get(url) {
            Some(CacheEntry::Content(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Store content for `url`, replacing any earlier failure marker.
    pub fn put(&self, url: &str, content: impl Into<String>) {
        self.lock()
            .put(url.to_string(), CacheEntry::Content(content.into()));
    }

    pub fn mark_error(&self, url: &str, reason: impl Into<String>) {
        self.lock()
            .put(url.to_string(), CacheEntry::Failed(reason.into()));
    }

    #[allow(dead_code)]
    pub fn has_error(&self, url: &str) -> bool {
        matches!(self.lock().get(url), Some(CacheEntry::Failed(_)))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
