//! Presentation state management

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::render::ViewTag;

/// Whether slides-with-notes documents are split into slide and notes halves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotesMode {
    /// Split only when the document looks like it carries notes
    #[default]
    Auto,
    On,
    Off,
}

impl NotesMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotesMode::Auto => "auto",
            NotesMode::On => "on",
            NotesMode::Off => "off",
        }
    }
}

/// Current position and overlays of a running presentation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentationState {
    /// Current page (0-indexed), always below `page_count` for non-empty documents
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// Audience output shows a black frame
    pub blanked: bool,

    /// Views are cropped into slide and notes halves
    pub notes_mode: bool,

    /// Whether notes mode may be switched on at all
    pub notes_available: bool,

    /// Page shown by the look-ahead view, `None` past the last page
    pub pending_next: Option<usize>,

    /// Last known size of every registered view
    pub viewports: BTreeMap<ViewTag, (u32, u32)>,
}

impl PresentationState {
    /// Initial state: first page, not blanked
    #[must_use]
    pub fn new(page_count: usize, has_notes: bool, notes: NotesMode) -> Self {
        let notes_available = has_notes || notes == NotesMode::On;
        let notes_mode = match notes {
            NotesMode::Auto => has_notes,
            NotesMode::On => true,
            NotesMode::Off => false,
        };

        Self {
            current_page: 0,
            page_count,
            blanked: false,
            notes_mode,
            notes_available,
            pending_next: (page_count > 1).then_some(1),
            viewports: BTreeMap::new(),
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::GoTo(page) => self.go_to(self.clamp(page)),
            Command::Next => self.go_to(self.clamp(self.current_page as i64 + 1)),
            Command::Previous => self.go_to(self.clamp(self.current_page as i64 - 1)),
            Command::First => self.go_to(0),
            Command::Last => self.go_to(self.page_count.saturating_sub(1)),

            Command::ToggleBlank => {
                self.blanked = !self.blanked;
                vec![Effect::PublishBlank]
            }

            Command::ToggleNotes => self.set_notes_mode(!self.notes_mode),
            Command::SetNotesMode(enabled) => self.set_notes_mode(enabled),

            Command::SetViewport { tag, width, height } => {
                if self.viewports.get(&tag) == Some(&(width, height)) {
                    return vec![];
                }
                self.viewports.insert(tag, (width, height));

                if width == 0 || height == 0 {
                    return vec![Effect::CancelView(tag)];
                }
                if tag == ViewTag::Main {
                    vec![Effect::RenderView(tag), Effect::UpdatePrefetch]
                } else {
                    vec![Effect::RenderView(tag)]
                }
            }
        }
    }

    fn go_to(&mut self, page: usize) -> Vec<Effect> {
        if self.current_page == page {
            return vec![Effect::PublishPage];
        }
        self.current_page = page;
        self.pending_next = (page + 1 < self.page_count).then_some(page + 1);
        vec![
            Effect::RenderAllViews,
            Effect::PublishPage,
            Effect::UpdatePrefetch,
        ]
    }

    fn set_notes_mode(&mut self, enabled: bool) -> Vec<Effect> {
        if enabled == self.notes_mode || (enabled && !self.notes_available) {
            return vec![];
        }
        self.notes_mode = enabled;
        vec![
            Effect::RenderAllViews,
            Effect::PublishNotes,
            Effect::UpdatePrefetch,
        ]
    }

    /// Out-of-range targets land on the nearest valid page
    fn clamp(&self, page: i64) -> usize {
        let last = self.page_count.saturating_sub(1);
        usize::try_from(page.max(0)).map_or(last, |page| page.min(last))
    }

    /// Size of a registered view that can currently be drawn into
    #[must_use]
    pub fn drawable_viewport(&self, tag: ViewTag) -> Option<(u32, u32)> {
        self.viewports
            .get(&tag)
            .copied()
            .filter(|&(width, height)| width > 0 && height > 0)
    }

    /// Labels for the current and next page
    #[must_use]
    pub fn labels(&self) -> PageLabels {
        PageLabels::new(self.current_page, self.page_count)
    }
}

/// Commands that modify presentation state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Go to a page; any integer is accepted and clamped
    GoTo(i64),
    Next,
    Previous,
    First,
    Last,
    /// Show or hide the black frame on the audience output
    ToggleBlank,
    ToggleNotes,
    SetNotesMode(bool),
    /// A view was registered or resized; zero size means hidden
    SetViewport {
        tag: ViewTag,
        width: u32,
        height: u32,
    },
}

impl Command {
    /// Whether the command moves through the document
    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::GoTo(_) | Self::Next | Self::Previous | Self::First | Self::Last
        )
    }
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Submit a render for one view at its last known size
    RenderView(ViewTag),
    /// Submit renders for every drawable view
    RenderAllViews,
    /// Drop whatever is outstanding for a view
    CancelView(ViewTag),
    /// Refresh look-ahead prefetch around the current page
    UpdatePrefetch,
    PublishPage,
    PublishBlank,
    PublishNotes,
}

/// Text of the console's page labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLabels {
    /// `cur/total`, 1-based
    pub current: String,
    /// `next/total`, or `--` on the last page
    pub next: String,
}

impl PageLabels {
    #[must_use]
    pub fn new(current: usize, count: usize) -> Self {
        let next = if current + 1 < count {
            format!("{}/{count}", current + 2)
        } else {
            "--".to_string()
        };
        Self {
            current: format!("{}/{count}", current + 1),
            next,
        }
    }
}

/// Parse typed page input (`n` or `n/total`, 1-based) into a 0-based target.
///
/// The result is not range checked; navigation clamps it.
#[must_use]
pub fn parse_page_entry(text: &str) -> Option<i64> {
    let number = text.split('/').next()?.trim();
    if number.is_empty() {
        return None;
    }
    number.parse::<i64>().ok().map(|n| n.saturating_sub(1))
}
