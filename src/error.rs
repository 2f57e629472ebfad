//! Error taxonomy shared by the loader, page sources and render workers

use std::path::PathBuf;

/// Document could not be opened. Fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not find the file \"{}\"", .0.display())]
    NotFound(PathBuf),

    #[error("\"{}\" is not a supported document (expected a PDF or a directory of images)", .0.display())]
    Unsupported(PathBuf),

    #[error("\"{}\" contains no pages", .0.display())]
    Empty(PathBuf),

    #[error("failed to read \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open \"{}\": {detail}", .path.display())]
    Backend { path: PathBuf, detail: String },
}

impl LoadError {
    pub fn backend(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::Backend {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// Errors reported by a [`PageSource`](crate::render::PageSource)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("page {index} is out of range (document has {count} pages)")]
    OutOfRange { index: usize, count: usize },

    #[error("page {page} could not be rasterized: {detail}")]
    Decode { page: usize, detail: String },
}

impl SourceError {
    pub fn decode(page: usize, detail: impl ToString) -> Self {
        Self::Decode {
            page,
            detail: detail.to_string(),
        }
    }

    /// Checks `index` against `count`
    pub fn check_index(index: usize, count: usize) -> Result<(), Self> {
        if index < count {
            Ok(())
        } else {
            Err(Self::OutOfRange { index, count })
        }
    }
}
