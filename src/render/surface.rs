//! Pixel surfaces produced by page sources and delivered to views

/// Bytes per pixel for every raster in this module (packed RGB)
pub const BYTES_PER_PIXEL: usize = 3;

const BLACK: [u8; 3] = [0, 0, 0];
const END_FILL: [u8; 3] = [0x1A, 0x1A, 0x1A];
const END_BAR: [u8; 3] = [0x55, 0x55, 0x55];
const UNAVAILABLE_FILL: [u8; 3] = [0x3C, 0x3C, 0x3C];
const UNAVAILABLE_MARK: [u8; 3] = [0x80, 0x80, 0x80];

/// What a surface shows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// A rendered document page (0-indexed)
    Page(usize),
    /// Placeholder for the look-ahead view past the last page
    EndOfDeck,
    /// Placeholder for a page that failed to rasterize
    Unavailable(usize),
    /// Plain black frame
    Blank,
}

/// A tightly sized raster as drawn by a page source, before letterboxing.
#[derive(Clone)]
pub struct Raster {
    /// Packed RGB pixel data
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Raster {
    /// Returns `None` when `pixels` does not hold `width * height` RGB pixels
    #[must_use]
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * BYTES_PER_PIXEL).then_some(Self {
            pixels,
            width,
            height,
        })
    }

    /// Copies the columns `[x0, x1)` into a new raster
    #[must_use]
    pub fn columns(&self, x0: u32, x1: u32) -> Self {
        let x0 = x0.min(self.width);
        let x1 = x1.clamp(x0, self.width);
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        let start = x0 as usize * BYTES_PER_PIXEL;
        let end = x1 as usize * BYTES_PER_PIXEL;

        let mut pixels = Vec::with_capacity((end - start) * self.height as usize);
        for row in self.pixels.chunks_exact(row_bytes) {
            pixels.extend_from_slice(&row[start..end]);
        }

        Self {
            pixels,
            width: x1 - x0,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// An owned pixel buffer of exactly `width` x `height` RGB pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelSurface {
    /// Packed RGB pixel data, row-major
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub kind: SurfaceKind,
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PixelSurface {
    /// Surface filled with a single color
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], kind: SurfaceKind) -> Self {
        let pixels = rgb.repeat(width as usize * height as usize);
        Self {
            pixels,
            width,
            height,
            kind,
        }
    }

    /// Black frame used while the audience view is blanked
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, BLACK, SurfaceKind::Blank)
    }

    /// "End of presentation" placeholder: dark frame with a centered bar
    #[must_use]
    pub fn end_of_deck(width: u32, height: u32) -> Self {
        let mut surface = Self::filled(width, height, END_FILL, SurfaceKind::EndOfDeck);
        let bar_height = (height / 40).max(1);
        let bar_width = width / 3;
        let x0 = (width - bar_width) / 2;
        let y0 = height.saturating_sub(bar_height) / 2;
        for y in y0..(y0 + bar_height).min(height) {
            for x in x0..x0 + bar_width {
                surface.put(x, y, END_BAR);
            }
        }
        surface
    }

    /// Neutral placeholder for a page that could not be rasterized: grey frame with a cross
    #[must_use]
    pub fn unavailable(width: u32, height: u32, page: usize) -> Self {
        let mut surface = Self::filled(
            width,
            height,
            UNAVAILABLE_FILL,
            SurfaceKind::Unavailable(page),
        );
        if width == 0 || height == 0 {
            return surface;
        }

        let steps = width.max(height);
        for i in 0..steps {
            let x = (u64::from(i) * u64::from(width) / u64::from(steps)) as u32;
            let y = (u64::from(i) * u64::from(height) / u64::from(steps)) as u32;
            surface.put(x, y, UNAVAILABLE_MARK);
            surface.put(width - 1 - x, y, UNAVAILABLE_MARK);
        }
        surface
    }

    /// Places `raster` centered on a black `width` x `height` frame, clipping any overflow.
    #[must_use]
    pub fn letterboxed(width: u32, height: u32, raster: &Raster, page: usize) -> Self {
        let mut surface = Self::filled(width, height, BLACK, SurfaceKind::Page(page));

        let copy_width = raster.width.min(width);
        let copy_height = raster.height.min(height);
        let dst_x = (width - copy_width) / 2;
        let dst_y = (height - copy_height) / 2;
        let src_x = (raster.width - copy_width) / 2;
        let src_y = (raster.height - copy_height) / 2;

        let src_stride = raster.width as usize * BYTES_PER_PIXEL;
        let dst_stride = width as usize * BYTES_PER_PIXEL;
        let span = copy_width as usize * BYTES_PER_PIXEL;

        for row in 0..copy_height as usize {
            let src = (src_y as usize + row) * src_stride + src_x as usize * BYTES_PER_PIXEL;
            let dst = (dst_y as usize + row) * dst_stride + dst_x as usize * BYTES_PER_PIXEL;
            surface.pixels[dst..dst + span].copy_from_slice(&raster.pixels[src..src + span]);
        }

        surface
    }

    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Page index this surface shows, if it shows one
    #[must_use]
    pub const fn page(&self) -> Option<usize> {
        match self.kind {
            SurfaceKind::Page(page) => Some(page),
            _ => None,
        }
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]])
    }

    /// Copy into an `image` buffer, e.g. for PNG export
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    fn put(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels[at..at + BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }
}
