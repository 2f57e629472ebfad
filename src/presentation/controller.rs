//! Page synchronization across the presentation views

use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, info};

use crate::render::{
    Crop, DEFAULT_PREFETCH_AHEAD, DEFAULT_PREFETCH_BEHIND, Delivery, RenderHandle, RenderRequest,
    RenderScheduler, ViewTag,
};

use super::state::{Command, Effect, NotesMode, PageLabels, PresentationState};

/// Controller tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub prefetch_ahead: usize,
    pub prefetch_behind: usize,
    pub notes_mode: NotesMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            prefetch_ahead: DEFAULT_PREFETCH_AHEAD,
            prefetch_behind: DEFAULT_PREFETCH_BEHIND,
            notes_mode: NotesMode::Auto,
        }
    }
}

/// Change notifications for presenters
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationEvent {
    PageChanged {
        current: usize,
        count: usize,
        next: Option<usize>,
    },
    BlankChanged(bool),
    NotesModeChanged(bool),
}

impl PresentationEvent {
    /// Console labels for a page change
    #[must_use]
    pub fn labels(&self) -> Option<PageLabels> {
        match *self {
            Self::PageChanged { current, count, .. } => Some(PageLabels::new(current, count)),
            _ => None,
        }
    }
}

/// Owns the presentation state and keeps every registered view on the same page.
///
/// Every page change fans out one render request per drawable view: the
/// current page for `Main` and `Secondary`, the following page (or the end
/// placeholder) for `Thumbnail`.
pub struct SyncController {
    state: PresentationState,
    scheduler: RenderScheduler,
    subscribers: Vec<Sender<PresentationEvent>>,
    config: ControllerConfig,
}

impl SyncController {
    #[must_use]
    pub fn new(scheduler: RenderScheduler, has_notes: bool, config: ControllerConfig) -> Self {
        let state = PresentationState::new(scheduler.page_count(), has_notes, config.notes_mode);
        info!(
            "Presenting {} pages, notes mode {}",
            state.page_count,
            if state.notes_mode { "on" } else { "off" }
        );

        Self {
            state,
            scheduler,
            subscribers: vec![],
            config,
        }
    }

    /// Add a view and render the current page for it
    pub fn register_view(&mut self, tag: ViewTag, width: u32, height: u32) {
        debug!("registering {tag} view at {width}x{height}");
        self.set_viewport(tag, width, height);
    }

    /// Record a new view size, superseding anything in flight for the view
    pub fn set_viewport(&mut self, tag: ViewTag, width: u32, height: u32) -> bool {
        self.apply(Command::SetViewport { tag, width, height })
    }

    /// Apply a command; returns whether anything changed
    pub fn apply(&mut self, cmd: Command) -> bool {
        let effects = self.state.apply(cmd);
        // A lone page event re-announces a page that did not change
        let changed = effects.iter().any(|effect| *effect != Effect::PublishPage);
        if changed && cmd.is_navigation() {
            info!(
                "Page {}/{}",
                self.state.current_page + 1,
                self.state.page_count
            );
        }
        self.execute_effects(effects);
        changed
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RenderView(tag) => {
                    self.submit_view(tag);
                }
                Effect::RenderAllViews => {
                    for tag in ViewTag::ALL {
                        self.submit_view(tag);
                    }
                }
                Effect::CancelView(tag) => self.scheduler.cancel(tag),
                Effect::UpdatePrefetch => self.update_prefetch(),
                Effect::PublishPage => self.publish(PresentationEvent::PageChanged {
                    current: self.state.current_page,
                    count: self.state.page_count,
                    next: self.state.pending_next,
                }),
                Effect::PublishBlank => {
                    info!(
                        "Audience output {}",
                        if self.state.blanked { "blanked" } else { "restored" }
                    );
                    self.publish(PresentationEvent::BlankChanged(self.state.blanked));
                }
                Effect::PublishNotes => {
                    self.publish(PresentationEvent::NotesModeChanged(self.state.notes_mode));
                }
            }
        }
    }

    /// The request `tag` needs right now, if it has a drawable viewport
    #[must_use]
    pub fn request_for(&self, tag: ViewTag) -> Option<RenderRequest> {
        let (width, height) = self.state.drawable_viewport(tag)?;
        let crop = self.crop_for(tag);

        Some(if tag.is_look_ahead() {
            match self.state.pending_next {
                Some(next) => RenderRequest::page(tag, next, width, height, crop),
                None => RenderRequest::end(tag, width, height),
            }
        } else {
            RenderRequest::page(tag, self.state.current_page, width, height, crop)
        })
    }

    /// Region of the page each view shows
    #[must_use]
    pub fn crop_for(&self, tag: ViewTag) -> Crop {
        if !self.state.notes_mode {
            return Crop::Full;
        }
        match tag {
            ViewTag::Main | ViewTag::Thumbnail => Crop::Content,
            ViewTag::Secondary => Crop::Notes,
        }
    }

    fn submit_view(&mut self, tag: ViewTag) -> Option<RenderHandle> {
        let request = self.request_for(tag)?;
        Some(self.scheduler.submit(request))
    }

    fn update_prefetch(&mut self) {
        let Some((width, height)) = self.state.drawable_viewport(ViewTag::Main) else {
            return;
        };
        let crop = self.crop_for(ViewTag::Main);
        let current = self.state.current_page;

        let ahead = (1..=self.config.prefetch_ahead).map(|offset| current.checked_add(offset));
        let behind = (1..=self.config.prefetch_behind).map(|offset| current.checked_sub(offset));

        let mut queued = 0;
        for page in ahead.chain(behind).flatten() {
            if self.scheduler.prefetch(page, width, height, crop) {
                queued += 1;
            }
        }
        if queued > 0 {
            debug!("prefetching {queued} pages around page {current}");
        }
    }

    fn publish(&mut self, event: PresentationEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Receive every future change notification
    pub fn subscribe(&mut self) -> Receiver<PresentationEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn goto(&mut self, index: i64) -> bool {
        self.apply(Command::GoTo(index))
    }

    pub fn next(&mut self) -> bool {
        self.apply(Command::Next)
    }

    pub fn previous(&mut self) -> bool {
        self.apply(Command::Previous)
    }

    pub fn first(&mut self) -> bool {
        self.apply(Command::First)
    }

    pub fn last(&mut self) -> bool {
        self.apply(Command::Last)
    }

    pub fn toggle_blank(&mut self) -> bool {
        self.apply(Command::ToggleBlank)
    }

    pub fn toggle_notes(&mut self) -> bool {
        self.apply(Command::ToggleNotes)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn is_blanked(&self) -> bool {
        self.state.blanked
    }

    #[must_use]
    pub fn notes_mode(&self) -> bool {
        self.state.notes_mode
    }

    #[must_use]
    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    #[must_use]
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Install the scheduler's delivery callback
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    /// Completed renders for the registered views
    pub fn poll_deliveries(&mut self) -> Vec<Delivery> {
        self.scheduler.poll()
    }

    /// Block up to `timeout` for completed renders
    pub fn wait_deliveries(&mut self, timeout: Duration) -> Vec<Delivery> {
        self.scheduler.wait(timeout)
    }

    /// Nothing submitted is still waiting to be delivered
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }
}
