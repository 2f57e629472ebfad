//! Document loading: picks a page source backend for a path

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::error::LoadError;
use crate::render::PageSource;
use crate::render::image_deck::ImageDeck;

/// A loaded document, ready to be shared with the render workers
pub struct LoadedDocument {
    pub source: Arc<dyn PageSource>,
    pub title: Option<String>,
    /// Whether pages carry speaker notes on their right half
    pub has_notes: bool,
}

impl std::fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("page_count", &self.source.page_count())
            .field("title", &self.title)
            .field("has_notes", &self.has_notes)
            .finish_non_exhaustive()
    }
}

/// Open a PDF file or a directory of slide images
pub fn load(path: &Path) -> Result<LoadedDocument, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let (source, title): (Arc<dyn PageSource>, Option<String>) = if path.is_dir() {
        (Arc::new(ImageDeck::open(path)?), None)
    } else {
        open_file(path)?
    };

    if source.page_count() == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    let has_notes = source
        .page_size(0)
        .is_ok_and(|size| size.has_notes_layout());

    info!(
        "Loaded {path:?}: {} pages{}",
        source.page_count(),
        if has_notes { ", with notes" } else { "" }
    );

    Ok(LoadedDocument {
        source,
        title,
        has_notes,
    })
}

#[cfg(feature = "pdf")]
fn open_file(path: &Path) -> Result<(Arc<dyn PageSource>, Option<String>), LoadError> {
    let pdf = crate::render::pdf_source::PdfSource::open(path)?;
    let title = pdf.title().map(str::to_string);
    Ok((Arc::new(pdf), title))
}

#[cfg(not(feature = "pdf"))]
fn open_file(path: &Path) -> Result<(Arc<dyn PageSource>, Option<String>), LoadError> {
    Err(LoadError::Unsupported(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_not_found() {
        let err = load(Path::new("/definitely/not/here.pdf")).expect_err("missing file");
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn directory_loads_as_image_deck() {
        let dir = tempfile::tempdir().expect("tempdir");
        image::RgbImage::new(64, 48)
            .save(dir.path().join("01.png"))
            .expect("write slide");

        let doc = load(dir.path()).expect("load deck");
        assert_eq!(doc.source.page_count(), 1);
        assert!(!doc.has_notes);
    }

    #[test]
    fn wide_slides_are_detected_as_notes_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        image::RgbImage::new(200, 75)
            .save(dir.path().join("01.png"))
            .expect("write slide");

        assert!(load(dir.path()).expect("load deck").has_notes);
    }
}
