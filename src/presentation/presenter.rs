//! Per-output presentation: owns the viewport sizes of one physical output
//! and paints whatever the render pipeline delivers for its views.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::render::{Delivery, PixelSurface, ViewTag};
use crate::timer::{ClockText, TimerEngine};

use super::controller::{PresentationEvent, SyncController};
use super::state::PageLabels;

/// How often the console refreshes its clock labels
pub const DEFAULT_CLOCK_TICK: Duration = Duration::from_millis(200);

/// Sink for everything a presenter shows; implemented by the GUI shell
pub trait Display {
    /// Replace the picture of one view
    fn paint(&mut self, tag: ViewTag, surface: &Arc<PixelSurface>);

    fn show_labels(&mut self, _labels: &PageLabels) {}

    fn show_clock(&mut self, _clock: &ClockText) {}
}

/// Which physical output a presenter drives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Projector: the current slide only
    Audience,
    /// Speaker screen: current slide or notes, next slide, clocks and labels
    Console,
}

impl Role {
    #[must_use]
    pub const fn tags(self) -> &'static [ViewTag] {
        match self {
            Self::Audience => &[ViewTag::Main],
            Self::Console => &[ViewTag::Secondary, ViewTag::Thumbnail],
        }
    }

    /// The output that owns `tag`
    #[must_use]
    pub const fn for_tag(tag: ViewTag) -> Self {
        match tag {
            ViewTag::Main => Self::Audience,
            ViewTag::Secondary | ViewTag::Thumbnail => Self::Console,
        }
    }
}

pub struct ViewPresenter {
    role: Role,
    display: Box<dyn Display>,
    viewports: HashMap<ViewTag, (u32, u32)>,
    /// Last surface delivered per view, kept to repaint after unblanking
    shown: HashMap<ViewTag, Arc<PixelSurface>>,
    blanked: bool,
    clock_tick: Duration,
    last_tick: Option<Instant>,
}

impl std::fmt::Debug for ViewPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewPresenter")
            .field("role", &self.role)
            .field("viewports", &self.viewports)
            .field("blanked", &self.blanked)
            .finish_non_exhaustive()
    }
}

impl ViewPresenter {
    #[must_use]
    pub fn new(role: Role, display: Box<dyn Display>, clock_tick: Duration) -> Self {
        Self {
            role,
            display,
            viewports: HashMap::new(),
            shown: HashMap::new(),
            blanked: false,
            clock_tick,
            last_tick: None,
        }
    }

    #[must_use]
    pub fn audience(display: Box<dyn Display>) -> Self {
        Self::new(Role::Audience, display, DEFAULT_CLOCK_TICK)
    }

    #[must_use]
    pub fn console(display: Box<dyn Display>) -> Self {
        Self::new(Role::Console, display, DEFAULT_CLOCK_TICK)
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn handles(&self, tag: ViewTag) -> bool {
        self.role.tags().contains(&tag)
    }

    #[must_use]
    pub fn viewport(&self, tag: ViewTag) -> Option<(u32, u32)> {
        self.viewports.get(&tag).copied()
    }

    #[must_use]
    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    /// Surface last painted (or held back while blanked) for `tag`
    #[must_use]
    pub fn last_surface(&self, tag: ViewTag) -> Option<&Arc<PixelSurface>> {
        self.shown.get(&tag)
    }

    /// A view of this output changed size; the controller re-renders it at the new size
    pub fn resize(
        &mut self,
        tag: ViewTag,
        width: u32,
        height: u32,
        controller: &mut SyncController,
    ) -> bool {
        if !self.handles(tag) {
            warn!("{:?} output has no {tag} view", self.role);
            return false;
        }
        debug!("{tag} view resized to {width}x{height}");
        self.viewports.insert(tag, (width, height));
        if self.blanked && tag == ViewTag::Main {
            self.paint_blank();
        }
        controller.set_viewport(tag, width, height)
    }

    /// Register every view of this output that already has a size
    pub fn attach(&self, controller: &mut SyncController) {
        for (&tag, &(width, height)) in &self.viewports {
            controller.register_view(tag, width, height);
        }
    }

    pub fn on_event(&mut self, event: &PresentationEvent) {
        match event {
            PresentationEvent::PageChanged { .. } => {
                if self.role == Role::Console {
                    if let Some(labels) = event.labels() {
                        self.display.show_labels(&labels);
                    }
                }
            }
            PresentationEvent::BlankChanged(blanked) => {
                if self.role == Role::Audience {
                    self.set_blanked(*blanked);
                }
            }
            PresentationEvent::NotesModeChanged(enabled) => {
                debug!("{:?} output: notes mode {enabled}", self.role);
            }
        }
    }

    fn set_blanked(&mut self, blanked: bool) {
        if self.blanked == blanked {
            return;
        }
        self.blanked = blanked;

        if blanked {
            self.paint_blank();
        } else if let Some(surface) = self.shown.get(&ViewTag::Main) {
            self.display.paint(ViewTag::Main, surface);
        }
    }

    fn paint_blank(&mut self) {
        let (width, height) = self.viewport(ViewTag::Main).unwrap_or((0, 0));
        self.display
            .paint(ViewTag::Main, &Arc::new(PixelSurface::blank(width, height)));
    }

    /// Paint a completed render; returns `false` if it is not for this output.
    ///
    /// Only the latest request per view is ever delivered, so the delivered
    /// size is the view's current size, whoever set it on the controller.
    pub fn on_delivery(&mut self, delivery: Delivery) -> bool {
        let tag = delivery.tag();
        if !self.handles(tag) {
            return false;
        }

        let size = delivery.request().size();
        if self.viewports.insert(tag, size) != Some(size) {
            debug!("{tag} view now {}x{}", size.0, size.1);
            if self.blanked && tag == ViewTag::Main {
                self.paint_blank();
            }
        }

        let surface = match delivery {
            Delivery::Rendered(rendered) => rendered.surface,
            Delivery::Failed { request, fault } => {
                warn!("{tag} view shows placeholder: {fault}");
                let page = fault.page().or(request.page_index()).unwrap_or_default();
                Arc::new(PixelSurface::unavailable(request.width, request.height, page))
            }
        };

        self.shown.insert(tag, surface.clone());
        if !(self.blanked && tag == ViewTag::Main) {
            self.display.paint(tag, &surface);
        }
        true
    }

    /// Refresh the clock labels if a tick has passed since the last refresh
    pub fn poll_clock(&mut self, timer: &TimerEngine, now: Instant) -> bool {
        if self.role != Role::Console {
            return false;
        }
        let due = self
            .last_tick
            .is_none_or(|last| now.saturating_duration_since(last) >= self.clock_tick);
        if !due {
            return false;
        }
        self.last_tick = Some(now);
        self.display.show_clock(&timer.clock_text());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::presentation::ControllerConfig;
    use crate::render::{
        Crop, RenderFault, RenderRequest, RenderScheduler, RenderedSurface, SchedulerConfig,
        SurfaceKind,
    };
    use crate::test_utils::{DisplayCall, RecordingDisplay, SyntheticDeck};

    fn rendered(tag: ViewTag, page: usize, width: u32, height: u32) -> Delivery {
        Delivery::Rendered(RenderedSurface {
            request: RenderRequest::page(tag, page, width, height, Crop::Full),
            surface: Arc::new(PixelSurface::filled(
                width,
                height,
                [9, 9, 9],
                SurfaceKind::Page(page),
            )),
        })
    }

    fn presenter(role: Role) -> (ViewPresenter, RecordingDisplay) {
        let display = RecordingDisplay::default();
        let mut presenter = ViewPresenter::new(role, Box::new(display.clone()), DEFAULT_CLOCK_TICK);
        for &tag in role.tags() {
            presenter.viewports.insert(tag, (20, 10));
        }
        (presenter, display)
    }

    #[test]
    fn paints_deliveries_for_its_views_only() {
        let (mut audience, display) = presenter(Role::Audience);

        assert!(audience.on_delivery(rendered(ViewTag::Main, 1, 20, 10)));
        assert!(!audience.on_delivery(rendered(ViewTag::Thumbnail, 2, 20, 10)));

        let paints = display.paints();
        assert_eq!(paints.len(), 1);
        assert_eq!(paints[0].0, ViewTag::Main);
        assert_eq!(paints[0].1.page(), Some(1));
    }

    #[test]
    fn delivered_size_becomes_the_viewport() {
        let display = RecordingDisplay::default();
        let mut audience = ViewPresenter::audience(Box::new(display.clone()));
        assert_eq!(audience.viewport(ViewTag::Main), None);

        assert!(audience.on_delivery(rendered(ViewTag::Main, 0, 640, 480)));
        assert_eq!(audience.viewport(ViewTag::Main), Some((640, 480)));
        assert_eq!(display.paints().len(), 1);

        audience.on_event(&PresentationEvent::BlankChanged(true));
        assert_eq!(
            display.last_paint(ViewTag::Main).map(|s| s.size()),
            Some((640, 480))
        );
    }

    #[test]
    fn decode_failure_paints_unavailable_placeholder() {
        let (mut console, display) = presenter(Role::Console);
        let request = RenderRequest::page(ViewTag::Secondary, 3, 20, 10, Crop::Full);

        console.on_delivery(Delivery::Failed {
            request,
            fault: RenderFault::from(SourceError::decode(3, "corrupt")),
        });
        console.on_delivery(rendered(ViewTag::Thumbnail, 4, 20, 10));

        let paints = display.paints();
        assert_eq!(paints[0].1.kind, SurfaceKind::Unavailable(3));
        assert_eq!(paints[0].1.size(), (20, 10));
        assert_eq!(paints[1].1.kind, SurfaceKind::Page(4));
    }

    #[test]
    fn blanking_holds_back_and_restores_the_slide() {
        let (mut audience, display) = presenter(Role::Audience);
        audience.on_delivery(rendered(ViewTag::Main, 0, 20, 10));

        audience.on_event(&PresentationEvent::BlankChanged(true));
        audience.on_delivery(rendered(ViewTag::Main, 1, 20, 10));
        audience.on_event(&PresentationEvent::BlankChanged(false));

        let kinds: Vec<_> = display.paints().iter().map(|(_, s)| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SurfaceKind::Page(0), SurfaceKind::Blank, SurfaceKind::Page(1)]
        );
    }

    #[test]
    fn resizing_while_blanked_repaints_black_at_new_size() {
        let scheduler = RenderScheduler::new(
            Arc::new(SyntheticDeck::new(3)),
            SchedulerConfig::default(),
        );
        let mut controller = SyncController::new(scheduler, false, ControllerConfig::default());
        let (mut audience, display) = presenter(Role::Audience);
        audience.on_event(&PresentationEvent::BlankChanged(true));

        audience.resize(ViewTag::Main, 80, 60, &mut controller);
        let last = display.last_paint(ViewTag::Main).expect("blank frame");
        assert_eq!(last.kind, SurfaceKind::Blank);
        assert_eq!(last.size(), (80, 60));

        for delivery in controller.wait_deliveries(Duration::from_secs(5)) {
            audience.on_delivery(delivery);
        }
        let last = display.last_paint(ViewTag::Main).expect("still blank");
        assert_eq!(last.kind, SurfaceKind::Blank);
    }

    #[test]
    fn console_ignores_blanking_and_shows_labels() {
        let (mut console, display) = presenter(Role::Console);
        console.on_event(&PresentationEvent::BlankChanged(true));
        assert!(!console.is_blanked());

        console.on_event(&PresentationEvent::PageChanged {
            current: 2,
            count: 3,
            next: None,
        });
        assert_eq!(
            display.calls().last(),
            Some(&DisplayCall::Labels(PageLabels {
                current: "3/3".to_string(),
                next: "--".to_string()
            }))
        );
    }

    #[test]
    fn clock_refreshes_once_per_tick() {
        let (mut console, display) = presenter(Role::Console);
        let timer = TimerEngine::default();
        let start = Instant::now();

        assert!(console.poll_clock(&timer, start));
        assert!(!console.poll_clock(&timer, start + Duration::from_millis(50)));
        assert!(console.poll_clock(&timer, start + Duration::from_millis(200)));
        assert_eq!(display.clocks().len(), 2);

        let (mut audience, _) = presenter(Role::Audience);
        assert!(!audience.poll_clock(&timer, start));
    }
}
