//! Image-directory backend: every image file in a directory is one page

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use fast_image_resize as fr;
use image::DynamicImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{LoadError, SourceError};

use super::source::{Crop, PageSize, PageSource};
use super::surface::Raster;

const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Assumed size of an image whose header cannot be read; rendering it fails later
const FALLBACK_SIZE: PageSize = PageSize::new(1024.0, 768.0);

#[derive(Debug)]
struct DeckPage {
    path: PathBuf,
    size: PageSize,
}

/// Slides stored as image files, ordered by file name
#[derive(Debug)]
pub struct ImageDeck {
    pages: Vec<DeckPage>,
}

impl ImageDeck {
    /// Index the images directly inside `dir`
    pub fn open(dir: &Path) -> Result<Self, LoadError> {
        if !dir.exists() {
            return Err(LoadError::NotFound(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| LoadError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        if paths.is_empty() {
            return Err(LoadError::Empty(dir.to_path_buf()));
        }

        Ok(Self::from_paths(paths))
    }

    /// Build a deck from image files in presentation order
    #[must_use]
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let pages: Vec<DeckPage> = paths
            .into_par_iter()
            .map(|path| {
                let size = match imagesize::size(&path) {
                    Ok(dim) => PageSize::new(dim.width as f32, dim.height as f32),
                    Err(e) => {
                        warn!("Could not read image header of {path:?}: {e}");
                        FALLBACK_SIZE
                    }
                };
                DeckPage { path, size }
            })
            .collect();

        info!("Indexed image deck with {} pages", pages.len());
        Self { pages }
    }

    fn page(&self, index: usize) -> Result<&DeckPage, SourceError> {
        self.pages.get(index).ok_or(SourceError::OutOfRange {
            index,
            count: self.pages.len(),
        })
    }
}

impl PageSource for ImageDeck {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize, SourceError> {
        self.page(index).map(|page| page.size)
    }

    fn rasterize(&self, index: usize, crop: Crop, scale: f32) -> Result<Raster, SourceError> {
        let page = self.page(index)?;
        let img = image::open(&page.path).map_err(|e| SourceError::decode(index, e))?;

        let (x0, x1) = crop.columns(img.width());
        let region = img.crop_imm(x0, 0, x1 - x0, img.height());

        let target_width = ((region.width() as f32 * scale).round() as u32).max(1);
        let target_height = ((region.height() as f32 * scale).round() as u32).max(1);
        debug!(
            "Scaling page {index} from {}x{} to {target_width}x{target_height}",
            region.width(),
            region.height()
        );

        let pixels = resize_rgb(&region, target_width, target_height)
            .map_err(|e| SourceError::decode(index, e))?;
        Raster::new(pixels, target_width, target_height)
            .ok_or_else(|| SourceError::decode(index, "resized buffer has unexpected length"))
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Resize using fast_image_resize, returning packed RGB
fn resize_rgb(
    src_image: &DynamicImage,
    new_width: u32,
    new_height: u32,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let src_rgb = src_image.to_rgb8();
    let (src_width, src_height) = src_rgb.dimensions();

    if (src_width, src_height) == (new_width, new_height) {
        return Ok(src_rgb.into_raw());
    }

    let src_image_view = fr::Image::from_vec_u8(
        NonZeroU32::new(src_width).ok_or("Invalid width")?,
        NonZeroU32::new(src_height).ok_or("Invalid height")?,
        src_rgb.into_raw(),
        fr::PixelType::U8x3,
    )?;

    let dst_width = NonZeroU32::new(new_width).ok_or("Invalid target width")?;
    let dst_height = NonZeroU32::new(new_height).ok_or("Invalid target height")?;
    let mut dst_image = fr::Image::new(dst_width, dst_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer.resize(&src_image_view.view(), &mut dst_image.view_mut())?;

    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_slide(dir: &Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb(rgb))
            .save(&path)
            .expect("write test image");
        path
    }

    #[test]
    fn open_orders_pages_by_file_name_and_skips_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_slide(dir.path(), "02.png", 40, 30, [0, 0, 255]);
        write_slide(dir.path(), "01.png", 80, 30, [255, 0, 0]);
        std::fs::write(dir.path().join("notes.txt"), "not a slide").expect("write");

        let deck = ImageDeck::open(dir.path()).expect("open deck");
        assert_eq!(deck.page_count(), 2);
        assert_eq!(deck.page_size(0), Ok(PageSize::new(80.0, 30.0)));
        assert_eq!(deck.page_size(1), Ok(PageSize::new(40.0, 30.0)));
        assert!(matches!(
            deck.page_size(2),
            Err(SourceError::OutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn empty_directory_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(ImageDeck::open(dir.path()), Err(LoadError::Empty(_))));
    }

    #[test]
    fn render_letterboxes_to_exact_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_slide(dir.path(), "a.png", 40, 20, [200, 10, 10]);
        let deck = ImageDeck::open(dir.path()).expect("open deck");

        let surface = deck.render(0, 40, 40).expect("render");
        assert_eq!(surface.size(), (40, 40));
        assert_eq!(surface.pixel(20, 2), Some([0, 0, 0]));
        assert_eq!(surface.pixel(20, 20), Some([200, 10, 10]));
    }

    #[test]
    fn notes_crop_shows_right_half() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut img = RgbImage::from_pixel(40, 10, Rgb([255, 0, 0]));
        for x in 20..40 {
            for y in 0..10 {
                img.put_pixel(x, y, Rgb([0, 255, 0]));
            }
        }
        img.save(dir.path().join("slide.png")).expect("write");
        let deck = ImageDeck::open(dir.path()).expect("open deck");

        let notes = deck.render_cropped(0, 20, 10, Crop::Notes).expect("render notes");
        assert_eq!(notes.pixel(10, 5), Some([0, 255, 0]));

        let content = deck.render_cropped(0, 20, 10, Crop::Content).expect("render content");
        assert_eq!(content.pixel(10, 5), Some([255, 0, 0]));
    }

    #[test]
    fn corrupt_image_is_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.png"), b"definitely not a png").expect("write");
        let deck = ImageDeck::open(dir.path()).expect("open deck");

        assert!(matches!(
            deck.render(0, 32, 24),
            Err(SourceError::Decode { page: 0, .. })
        ));
    }
}
