use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::apod::Image;

/// What the cache currently knows about today's picture.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub cached_date: String,
    pub cached_image: Option<Image>,
}

/// Single-slot cache for today's APOD.
///
/// Readers share the lock. [`TodayCache::update`] swaps the whole entry under
/// the write lock, so `cached_date` and `cached_image` are always observed
/// together. Two callers racing on a cold cache may both fetch; the slot
/// simply ends up holding the later result.
#[derive(Debug, Default)]
pub struct TodayCache {
    state: RwLock<CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    updates: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub updates: u64,
}

impl TodayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached image if it was published for `today` (`YYYY-MM-DD`).
    pub async fn read_today(&self, today: &str) -> Option<Image> {
        let state = self.state.read().await;
        match &state.cached_image {
            Some(image) if state.cached_date == today => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", today);
                Some(image.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for {} (cached: {:?})", today, state.cached_date);
                None
            }
        }
    }

    pub async fn update(&self, image: Image) {
        let entry = CacheEntry {
            cached_date: image.date.clone(),
            cached_image: Some(image),
        };
        let mut state = self.state.write().await;
        *state = entry;
        self.updates.fetch_add(1, Ordering::Relaxed);
        info!("Cached today's APOD for {}", state.cached_date);
    }

    pub async fn snapshot(&self) -> CacheEntry {
        self.state.read().await.clone()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }
}
