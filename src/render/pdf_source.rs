//! MuPDF backend
//!
//! MuPDF documents cannot be shared across threads, so every render worker
//! opens its own handle on first use and keeps it in a thread-local slot.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use log::{info, warn};
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use crate::error::{LoadError, SourceError};

use super::source::{Crop, PageSize, PageSource};
use super::surface::{BYTES_PER_PIXEL, Raster};

thread_local! {
    static WORKER_DOCUMENT: RefCell<Option<(PathBuf, Document)>> = const { RefCell::new(None) };
}

/// A PDF opened with MuPDF
#[derive(Debug)]
pub struct PdfSource {
    path: PathBuf,
    sizes: Vec<PageSize>,
    title: Option<String>,
}

impl PdfSource {
    /// Open `path` and read every page's bounds
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| LoadError::backend(path, e))?;
        let page_count = doc.page_count().map_err(|e| LoadError::backend(path, e))?;
        if page_count <= 0 {
            return Err(LoadError::Empty(path.to_path_buf()));
        }

        let mut sizes = Vec::with_capacity(page_count as usize);
        for index in 0..page_count {
            let size = doc
                .load_page(index)
                .and_then(|page| page.bounds())
                .map(|b| PageSize::new(b.x1 - b.x0, b.y1 - b.y0));
            match size {
                Ok(size) => sizes.push(size),
                Err(e) => {
                    // Keep the index valid; the page reports a decode error when drawn
                    warn!("Could not read bounds of page {index}: {e}");
                    sizes.push(sizes.last().copied().unwrap_or(PageSize::new(4.0, 3.0)));
                }
            }
        }

        let title = doc
            .metadata(mupdf::MetadataName::Title)
            .ok()
            .filter(|t| !t.is_empty());

        info!("Opened {path:?}: {} pages, title {title:?}", sizes.len());

        Ok(Self {
            path: path.to_path_buf(),
            sizes,
            title,
        })
    }

    /// Document title from the PDF metadata
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn with_document<R>(
        &self,
        index: usize,
        f: impl FnOnce(&Document) -> Result<R, SourceError>,
    ) -> Result<R, SourceError> {
        WORKER_DOCUMENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            let stale = slot.as_ref().is_none_or(|(path, _)| path != &self.path);
            if stale {
                let doc = Document::open(self.path.to_string_lossy().as_ref())
                    .map_err(|e| SourceError::decode(index, e))?;
                *slot = Some((self.path.clone(), doc));
            }

            match slot.as_ref() {
                Some((_, doc)) => f(doc),
                None => Err(SourceError::decode(index, "document handle unavailable")),
            }
        })
    }
}

impl PageSource for PdfSource {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize, SourceError> {
        self.sizes.get(index).copied().ok_or(SourceError::OutOfRange {
            index,
            count: self.sizes.len(),
        })
    }

    fn rasterize(&self, index: usize, crop: Crop, scale: f32) -> Result<Raster, SourceError> {
        SourceError::check_index(index, self.sizes.len())?;

        self.with_document(index, |doc| {
            let decode = |e: mupdf::error::Error| SourceError::decode(index, e);

            let page = doc.load_page(index as i32).map_err(decode)?;
            let transform = Matrix::new_scale(scale, scale);
            let pixmap = page
                .to_pixmap(&transform, &Colorspace::device_rgb(), false, false)
                .map_err(decode)?;

            let full = pixmap_to_raster(&pixmap).map_err(|detail| SourceError::decode(index, detail))?;
            if crop == Crop::Full {
                return Ok(full);
            }
            let (x0, x1) = crop.columns(full.width);
            Ok(full.columns(x0, x1))
        })
    }
}

fn pixmap_to_raster(pixmap: &Pixmap) -> Result<Raster, String> {
    let n = pixmap.n() as usize;
    if n < BYTES_PER_PIXEL {
        return Err(format!("Unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err("Pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * BYTES_PER_PIXEL);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == BYTES_PER_PIXEL {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..BYTES_PER_PIXEL]);
            }
        }
    }

    Raster::new(out, pixmap.width(), pixmap.height())
        .ok_or_else(|| "Pixmap conversion produced a short buffer".to_string())
}
