use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use lru::LruCache;
use metrics::counter;
use tokio::sync::Mutex;

use crate::config::CacheSettings;

/// Prefix shared by every entry of the index listing.
pub const INDEX_PAGE_KEY: &str = "index_page";

const DISABLED_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// Keyed store of rendered HTML fragments with a fixed time-to-live.
///
/// Entries are shared by all visitors, so only visitor-independent markup may
/// be stored. An entry leaves the cache when its TTL elapses, when it is the
/// least recently used one and the cache is full, or on [`clear`].
///
/// [`clear`]: PageCache::clear
#[derive(Clone)]
pub struct PageCache {
    entries: Arc<Mutex<LruCache<String, CachedFragment>>>,
    ttl: Duration,
    enabled: bool,
}

#[derive(Clone)]
struct CachedFragment {
    html: Arc<str>,
    stored_at: Instant,
}

impl PageCache {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO, DISABLED_CAPACITY)
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        if settings.enabled {
            Self::new(
                Duration::from_secs(settings.index_ttl_seconds),
                settings.max_entries,
            )
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        if !self.enabled {
            return None;
        }

        let hit = {
            let mut guard = self.entries.lock().await;
            let fresh = guard
                .get(key)
                .map(|entry| (entry.stored_at.elapsed() < self.ttl, entry.html.clone()));
            match fresh {
                Some((true, html)) => Some(html),
                Some((false, _)) => {
                    guard.pop(key);
                    None
                }
                None => None,
            }
        };

        if hit.is_some() {
            counter!("yatube_page_cache_hit_total").increment(1);
        } else {
            counter!("yatube_page_cache_miss_total").increment(1);
        }
        hit
    }

    pub async fn put(&self, key: impl Into<String>, html: impl Into<Arc<str>>) {
        if !self.enabled {
            return;
        }

        let mut guard = self.entries.lock().await;
        guard.put(
            key.into(),
            CachedFragment {
                html: html.into(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry, expired or not.
    pub async fn clear(&self) {
        let mut guard = self.entries.lock().await;
        let dropped = guard.len();
        guard.clear();
        if dropped > 0 {
            counter!("yatube_page_cache_clear_total").increment(1);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Cache key of one resolved page of the index listing.
pub fn index_page_key(page_number: u64) -> String {
    format!("{INDEX_PAGE_KEY}:{page_number}")
}
