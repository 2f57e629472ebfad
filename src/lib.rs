//! Dual-output presentation engine: renders document pages off the UI thread
//! and keeps the audience and speaker outputs on the same page.

pub mod document;
pub mod error;
pub mod logging;
pub mod panic_handler;
pub mod presentation;
pub mod render;
pub mod session;
pub mod settings;
pub mod timer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use document::{LoadedDocument, load};
pub use error::{LoadError, SourceError};
pub use presentation::{Command, Display, SyncController, ViewPresenter};
pub use render::{PageSource, PixelSurface, RenderScheduler, ViewTag};
pub use session::{Input, Session};
pub use timer::{TimerCommand, TimerEngine};
