//! Render request and delivery types

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SourceError;

use super::cache::CacheKey;
use super::source::Crop;
use super::surface::PixelSurface;

/// Which output and role a request or result belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewTag {
    /// Current page on the audience display (projector)
    Main,
    /// Current page on the speaker console
    Secondary,
    /// Next page preview on the speaker console
    Thumbnail,
}

impl ViewTag {
    pub const ALL: [ViewTag; 3] = [ViewTag::Main, ViewTag::Secondary, ViewTag::Thumbnail];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Secondary => "secondary",
            Self::Thumbnail => "thumbnail",
        }
    }

    /// Whether this view shows the page after the current one
    #[must_use]
    pub const fn is_look_ahead(self) -> bool {
        matches!(self, Self::Thumbnail)
    }
}

impl fmt::Display for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic per-tag request counter; only the latest generation of a tag is ever delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

/// What a request asks to be drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageSlot {
    Page(usize),
    /// Past the last page: the "end" placeholder
    End,
}

/// A request to draw one page (or placeholder) for one view at one size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderRequest {
    pub tag: ViewTag,
    pub slot: PageSlot,
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
}

impl RenderRequest {
    #[must_use]
    pub const fn page(tag: ViewTag, index: usize, width: u32, height: u32, crop: Crop) -> Self {
        Self {
            tag,
            slot: PageSlot::Page(index),
            width,
            height,
            crop,
        }
    }

    #[must_use]
    pub const fn end(tag: ViewTag, width: u32, height: u32) -> Self {
        Self {
            tag,
            slot: PageSlot::End,
            width,
            height,
            crop: Crop::Full,
        }
    }

    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub const fn page_index(&self) -> Option<usize> {
        match self.slot {
            PageSlot::Page(index) => Some(index),
            PageSlot::End => None,
        }
    }
}

/// Returned by `submit`; identifies the one request that may still be delivered for its tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderHandle {
    pub tag: ViewTag,
    pub generation: Generation,
}

/// Errors from render workers
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderFault {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("renderer panicked while drawing page {page}")]
    Panicked { page: usize },
}

impl RenderFault {
    /// Page the fault concerns, if any
    #[must_use]
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::Source(SourceError::Decode { page, .. }) | Self::Panicked { page } => Some(*page),
            Self::Source(SourceError::OutOfRange { index, .. }) => Some(*index),
        }
    }
}

/// A completed, non-superseded render
#[derive(Clone, Debug)]
pub struct RenderedSurface {
    pub request: RenderRequest,
    pub surface: Arc<PixelSurface>,
}

/// Result handed to the view that issued the request
#[derive(Debug)]
pub enum Delivery {
    Rendered(RenderedSurface),
    Failed {
        request: RenderRequest,
        fault: RenderFault,
    },
}

impl Delivery {
    #[must_use]
    pub const fn tag(&self) -> ViewTag {
        self.request().tag
    }

    #[must_use]
    pub const fn request(&self) -> &RenderRequest {
        match self {
            Self::Rendered(rendered) => &rendered.request,
            Self::Failed { request, .. } => request,
        }
    }
}

/// Work item sent to render workers
#[derive(Debug)]
pub(crate) enum WorkerJob {
    /// Render for a view; skipped if superseded before a worker picks it up
    Render {
        generation: Generation,
        request: RenderRequest,
    },

    /// Fill the cache ahead of navigation; never delivered
    Prefetch(CacheKey),

    Shutdown,
}

/// Output of a worker, checked against the generation table before delivery
#[derive(Debug)]
pub(crate) struct WorkerOutput {
    pub generation: Generation,
    pub request: RenderRequest,
    pub result: Result<Arc<PixelSurface>, RenderFault>,
}

/// Latest issued generation per view tag, shared between the scheduler and its workers
#[derive(Debug, Default)]
pub(crate) struct GenerationTable {
    latest: Mutex<HashMap<ViewTag, u64>>,
}

impl GenerationTable {
    /// Issue a new generation for `tag`, superseding every earlier one
    pub fn advance(&self, tag: ViewTag) -> Generation {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let next = latest.get(&tag).copied().unwrap_or(0) + 1;
        latest.insert(tag, next);
        Generation(next)
    }

    pub fn is_current(&self, tag: ViewTag, generation: Generation) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tag)
            .is_some_and(|latest| *latest == generation.0)
    }
}
