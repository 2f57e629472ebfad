//! In-memory LRU cache of rendered pages
//!
//! Lives for the process only. The key carries the target size and crop, so a
//! resized view never gets pixels rendered for its previous size.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::request::{PageSlot, RenderRequest};
use super::source::Crop;
use super::surface::PixelSurface;

/// Cache key for rendered pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page number
    pub page: usize,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Region of the page
    pub crop: Crop,
}

impl CacheKey {
    #[must_use]
    pub const fn new(page: usize, width: u32, height: u32, crop: Crop) -> Self {
        Self {
            page,
            width,
            height,
            crop,
        }
    }

    /// Key for a request, `None` for placeholders
    #[must_use]
    pub const fn from_request(request: &RenderRequest) -> Option<Self> {
        match request.slot {
            PageSlot::Page(page) => Some(Self::new(page, request.width, request.height, request.crop)),
            PageSlot::End => None,
        }
    }
}

/// LRU cache for rendered surfaces
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<PixelSurface>>,
}

impl PageCache {
    /// Create a new cache with the given capacity (at least one entry)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached surface, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<PixelSurface>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a surface into the cache, returning an Arc to it
    pub fn insert(&mut self, key: CacheKey, surface: PixelSurface) -> Arc<PixelSurface> {
        let arc = Arc::new(surface);
        self.cache.put(key, arc.clone());
        arc
    }

    /// Number of cached surfaces
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
