//! Presentation engine: navigation state, view synchronization and per-output presenters

mod controller;
mod presenter;
mod state;

pub use controller::{ControllerConfig, PresentationEvent, SyncController};
pub use presenter::{DEFAULT_CLOCK_TICK, Display, Role, ViewPresenter};
pub use state::{Command, Effect, NotesMode, PageLabels, PresentationState, parse_page_entry};
