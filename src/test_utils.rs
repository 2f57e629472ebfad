//! Test doubles shared by unit and integration tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::SourceError;
use crate::presentation::{Display, PageLabels};
use crate::render::{Crop, PageSize, PageSource, PixelSurface, Raster, ViewTag};
use crate::timer::ClockText;

pub use crate::timer::ManualClock;

/// Solid color of page `index`; distinct for the first few hundred pages
#[must_use]
pub fn page_color(index: usize) -> [u8; 3] {
    [
        (40 + index * 50 % 200) as u8,
        (30 + index * 90 % 200) as u8,
        (20 + index * 130 % 200) as u8,
    ]
}

/// Color of the notes half of page `index` in a notes-layout deck
#[must_use]
pub fn notes_color(index: usize) -> [u8; 3] {
    let [r, g, b] = page_color(index);
    [255 - r, 255 - g, 255 - b]
}

/// In-memory page source: every page is one solid color.
///
/// Pages can be made slow, undecodable or panicking to exercise the
/// scheduler's failure paths.
#[derive(Debug)]
pub struct SyntheticDeck {
    page_count: usize,
    page_size: PageSize,
    delay: Duration,
    broken: HashSet<usize>,
    panicking: HashSet<usize>,
    renders: Arc<AtomicUsize>,
}

impl SyntheticDeck {
    /// `page_count` pages of 400x300
    #[must_use]
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            page_size: PageSize::new(400.0, 300.0),
            delay: Duration::ZERO,
            broken: HashSet::new(),
            panicking: HashSet::new(),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Slides on the left half, notes in `notes_color` on the right
    #[must_use]
    pub fn with_notes(mut self) -> Self {
        self.page_size = PageSize::new(800.0, 300.0);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, width: f32, height: f32) -> Self {
        self.page_size = PageSize::new(width, height);
        self
    }

    /// Every rasterization sleeps this long first
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_broken_page(mut self, index: usize) -> Self {
        self.broken.insert(index);
        self
    }

    #[must_use]
    pub fn with_panicking_page(mut self, index: usize) -> Self {
        self.panicking.insert(index);
        self
    }

    /// Counts calls to `rasterize`, shared with the caller
    #[must_use]
    pub fn render_counter(&self) -> Arc<AtomicUsize> {
        self.renders.clone()
    }
}

impl PageSource for SyntheticDeck {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Result<PageSize, SourceError> {
        SourceError::check_index(index, self.page_count)?;
        Ok(self.page_size)
    }

    fn rasterize(&self, index: usize, crop: Crop, scale: f32) -> Result<Raster, SourceError> {
        SourceError::check_index(index, self.page_count)?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panicking.contains(&index) {
            panic!("synthetic renderer crashed on page {index}");
        }
        if self.broken.contains(&index) {
            return Err(SourceError::decode(index, "synthetic corrupt page"));
        }

        let width = ((self.page_size.width * scale).round() as u32).max(1);
        let height = ((self.page_size.height * scale).round() as u32).max(1);
        let split = if self.page_size.has_notes_layout() {
            width / 2
        } else {
            width
        };

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..height {
            for x in 0..width {
                let rgb = if x < split {
                    page_color(index)
                } else {
                    notes_color(index)
                };
                pixels.extend_from_slice(&rgb);
            }
        }

        let full = Raster::new(pixels, width, height)
            .ok_or_else(|| SourceError::decode(index, "synthetic raster size mismatch"))?;
        if crop == Crop::Full {
            return Ok(full);
        }
        let (x0, x1) = crop.columns(width);
        Ok(full.columns(x0, x1))
    }
}

/// One call made on a [`RecordingDisplay`]
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayCall {
    Paint(ViewTag, Arc<PixelSurface>),
    Labels(PageLabels),
    Clock(ClockText),
}

/// `Display` that records every call; clones share the same log
#[derive(Clone, Debug, Default)]
pub struct RecordingDisplay {
    calls: Arc<Mutex<Vec<DisplayCall>>>,
}

impl RecordingDisplay {
    #[must_use]
    pub fn calls(&self) -> Vec<DisplayCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every painted surface, oldest first
    #[must_use]
    pub fn paints(&self) -> Vec<(ViewTag, Arc<PixelSurface>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Paint(tag, surface) => Some((tag, surface)),
                _ => None,
            })
            .collect()
    }

    /// Surfaces painted for one view, oldest first
    #[must_use]
    pub fn paints_for(&self, tag: ViewTag) -> Vec<Arc<PixelSurface>> {
        self.paints()
            .into_iter()
            .filter(|(painted, _)| *painted == tag)
            .map(|(_, surface)| surface)
            .collect()
    }

    #[must_use]
    pub fn last_paint(&self, tag: ViewTag) -> Option<Arc<PixelSurface>> {
        self.paints_for(tag).pop()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<PageLabels> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Labels(labels) => Some(labels),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn clocks(&self) -> Vec<ClockText> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Clock(clock) => Some(clock),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DisplayCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Display for RecordingDisplay {
    fn paint(&mut self, tag: ViewTag, surface: &Arc<PixelSurface>) {
        self.record(DisplayCall::Paint(tag, surface.clone()));
    }

    fn show_labels(&mut self, labels: &PageLabels) {
        self.record(DisplayCall::Labels(labels.clone()));
    }

    fn show_clock(&mut self, clock: &ClockText) {
        self.record(DisplayCall::Clock(clock.clone()));
    }
}
