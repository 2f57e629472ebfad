//! File logging setup for the shell binary

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("could not create log file \"{}\": {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Install(#[from] log::SetLoggerError),
}

/// Parse a configured level name (`off`, `error` .. `trace`), case-insensitively
#[must_use]
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

/// Route `log` records from this crate to `path`.
///
/// The logger accepts every level; call [`log::set_max_level`] afterwards to
/// apply the configured one.
pub fn init_file_logger(path: &Path) -> Result<(), LogInitError> {
    let file = File::create(path).map_err(|source| LogInitError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ConfigBuilder::new().add_filter_allow_str("lectern").build();

    WriteLogger::init(LevelFilter::Trace, config, file)?;
    Ok(())
}
