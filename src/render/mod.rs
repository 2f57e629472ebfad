//! Page rendering infrastructure

mod cache;
pub mod image_deck;
#[cfg(feature = "pdf")]
pub mod pdf_source;
mod request;
mod scheduler;
mod source;
mod surface;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use request::{
    Delivery, Generation, PageSlot, RenderFault, RenderHandle, RenderRequest, RenderedSurface,
    ViewTag,
};
pub use scheduler::{RenderScheduler, SchedulerConfig};
pub use source::{Crop, NOTES_ASPECT_RATIO, PageSize, PageSource, Placement, fit_letterbox};
pub use surface::{BYTES_PER_PIXEL, PixelSurface, Raster, SurfaceKind};
pub use worker::Waker;

/// Render threads spawned when the configuration does not say otherwise
pub const DEFAULT_WORKERS: usize = 2;

/// Rendered surfaces kept in memory
pub const DEFAULT_CACHE_PAGES: usize = 16;

/// Pages prefetched after the current one
pub const DEFAULT_PREFETCH_AHEAD: usize = 4;

/// Pages prefetched before the current one
pub const DEFAULT_PREFETCH_BEHIND: usize = 2;
