//! Page source capability and fit geometry

use crate::error::SourceError;

use super::surface::{PixelSurface, Raster, SurfaceKind};

/// Pages at least this many times wider than tall carry speaker notes on their right half
pub const NOTES_ASPECT_RATIO: f32 = 2.0;

/// Intrinsic page size in document units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn aspect_ratio(self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// Whether the page is laid out as slide (left half) plus notes (right half)
    #[must_use]
    pub fn has_notes_layout(self) -> bool {
        self.aspect_ratio() >= NOTES_ASPECT_RATIO
    }
}

/// Horizontal region of a page shown by a view
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Crop {
    /// The whole page
    #[default]
    Full,
    /// Left half of a notes-layout page (the slide)
    Content,
    /// Right half of a notes-layout page (the speaker notes)
    Notes,
}

impl Crop {
    /// Fractions of the page width covered by this crop
    #[must_use]
    pub const fn span(self) -> (f32, f32) {
        match self {
            Self::Full => (0.0, 1.0),
            Self::Content => (0.0, 0.5),
            Self::Notes => (0.5, 1.0),
        }
    }

    /// Size of the cropped region of a page of `size`
    #[must_use]
    pub fn apply(self, size: PageSize) -> PageSize {
        let (start, end) = self.span();
        PageSize::new(size.width * (end - start), size.height)
    }

    /// Pixel column range of this crop in a raster `width` pixels wide
    #[must_use]
    pub fn columns(self, width: u32) -> (u32, u32) {
        let (start, end) = self.span();
        let x0 = (start * width as f32).round() as u32;
        let x1 = (end * width as f32).round() as u32;
        (x0.min(width), x1.clamp(x0.min(width), width))
    }
}

/// Where a scaled page lands inside a target frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Document units to pixels
    pub scale: f32,
    /// Scaled content size in pixels
    pub width: u32,
    pub height: u32,
    /// Offset of the content inside the frame
    pub x: u32,
    pub y: u32,
}

/// Scale `page` to fit inside `target_width` x `target_height` without distortion.
#[must_use]
pub fn fit_letterbox(page: PageSize, target_width: u32, target_height: u32) -> Placement {
    if page.width <= 0.0 || page.height <= 0.0 || target_width == 0 || target_height == 0 {
        return Placement {
            scale: 0.0,
            width: 0,
            height: 0,
            x: 0,
            y: 0,
        };
    }

    let scale_x = target_width as f32 / page.width;
    let scale_y = target_height as f32 / page.height;
    let scale = scale_x.min(scale_y);

    let width = ((page.width * scale).round() as u32).clamp(1, target_width);
    let height = ((page.height * scale).round() as u32).clamp(1, target_height);

    Placement {
        scale,
        width,
        height,
        x: (target_width - width) / 2,
        y: (target_height - height) / 2,
    }
}

/// A loaded, immutable document able to draw any of its pages at any size.
///
/// Implementations are shared by every render worker, so they must tolerate
/// concurrent calls. Backends whose primitives are not safe for concurrent
/// reads keep per-thread handles or serialize behind a lock held for a single
/// call only.
pub trait PageSource: Send + Sync {
    /// Number of pages; indices are `0..page_count()`
    fn page_count(&self) -> usize;

    /// Intrinsic size of page `index`
    fn page_size(&self, index: usize) -> Result<PageSize, SourceError>;

    /// Draw the `crop` region of page `index` scaled by `scale`, sized tightly to the content.
    ///
    /// Blocking and potentially slow; only render workers call this.
    fn rasterize(&self, index: usize, crop: Crop, scale: f32) -> Result<Raster, SourceError>;

    /// Render page `index` into a surface of exactly `width` x `height`, letterboxed.
    fn render(&self, index: usize, width: u32, height: u32) -> Result<PixelSurface, SourceError> {
        self.render_cropped(index, width, height, Crop::Full)
    }

    /// Render the `crop` region of page `index` into a surface of exactly `width` x `height`.
    fn render_cropped(
        &self,
        index: usize,
        width: u32,
        height: u32,
        crop: Crop,
    ) -> Result<PixelSurface, SourceError> {
        let size = self.page_size(index)?;
        let placement = fit_letterbox(crop.apply(size), width, height);
        if placement.width == 0 || placement.height == 0 {
            return Ok(PixelSurface::filled(
                width,
                height,
                [0, 0, 0],
                SurfaceKind::Page(index),
            ));
        }

        let raster = self.rasterize(index, crop, placement.scale)?;
        Ok(PixelSurface::letterboxed(width, height, &raster, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_letterbox_pillarboxes_tall_page() {
        let placement = fit_letterbox(PageSize::new(300.0, 400.0), 800, 400);
        assert!((placement.scale - 1.0).abs() < f32::EPSILON);
        assert_eq!((placement.width, placement.height), (300, 400));
        assert_eq!((placement.x, placement.y), (250, 0));
    }

    #[test]
    fn fit_letterbox_letterboxes_wide_page() {
        let placement = fit_letterbox(PageSize::new(1600.0, 900.0), 800, 800);
        assert_eq!((placement.width, placement.height), (800, 450));
        assert_eq!((placement.x, placement.y), (0, 175));
    }

    #[test]
    fn fit_letterbox_zero_target_is_empty() {
        let placement = fit_letterbox(PageSize::new(100.0, 100.0), 0, 300);
        assert_eq!((placement.width, placement.height), (0, 0));
    }

    #[test]
    fn notes_layout_detection() {
        assert!(PageSize::new(2048.0, 768.0).has_notes_layout());
        assert!(!PageSize::new(1024.0, 768.0).has_notes_layout());
        assert!(!PageSize::new(1600.0, 900.0).has_notes_layout());
    }

    #[test]
    fn crop_halves_width() {
        let page = PageSize::new(2000.0, 750.0);
        assert_eq!(Crop::Content.apply(page), PageSize::new(1000.0, 750.0));
        assert_eq!(Crop::Notes.apply(page), PageSize::new(1000.0, 750.0));
        assert_eq!(Crop::Full.apply(page), page);

        assert_eq!(Crop::Content.columns(101), (0, 51));
        assert_eq!(Crop::Notes.columns(101), (51, 101));
    }
}
