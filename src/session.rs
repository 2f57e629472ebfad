//! UI-thread glue between input, the controller, the timer and both outputs

use std::time::{Duration, Instant};

use flume::Receiver;
use log::{debug, warn};

use crate::presentation::{
    Command, PresentationEvent, Role, SyncController, ViewPresenter, parse_page_entry,
};
use crate::render::{Delivery, ViewTag};
use crate::timer::{TimerCommand, TimerEngine};

/// Commands delivered by the window/input layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Navigate(Command),
    Timer(TimerCommand),
    Resize {
        tag: ViewTag,
        width: u32,
        height: u32,
    },
    /// Text typed into the console's page label
    PageEntry(String),
}

/// Owns everything that runs on the UI thread.
///
/// Hosts call [`handle`](Self::handle) for each input and [`pump`](Self::pump)
/// whenever the render waker fires or the clock tick elapses.
pub struct Session {
    controller: SyncController,
    timer: TimerEngine,
    audience: ViewPresenter,
    console: ViewPresenter,
    events: Receiver<PresentationEvent>,
    start_timer_on_navigation: bool,
}

impl Session {
    #[must_use]
    pub fn new(
        mut controller: SyncController,
        timer: TimerEngine,
        audience: ViewPresenter,
        console: ViewPresenter,
        start_timer_on_navigation: bool,
    ) -> Self {
        let events = controller.subscribe();
        audience.attach(&mut controller);
        console.attach(&mut controller);

        Self {
            controller,
            timer,
            audience,
            console,
            events,
            start_timer_on_navigation,
        }
    }

    /// Apply one input; returns whether it changed anything
    pub fn handle(&mut self, input: Input) -> bool {
        let changed = match input {
            Input::Navigate(cmd) => self.navigate(cmd),
            Input::Timer(cmd) => {
                self.timer.apply(cmd);
                true
            }
            Input::Resize { tag, width, height } => {
                let presenter = match Role::for_tag(tag) {
                    Role::Audience => &mut self.audience,
                    Role::Console => &mut self.console,
                };
                presenter.resize(tag, width, height, &mut self.controller)
            }
            Input::PageEntry(text) => match parse_page_entry(&text) {
                Some(target) => self.navigate(Command::GoTo(target)),
                None => {
                    warn!("Ignoring page entry {text:?}");
                    false
                }
            },
        };
        self.dispatch_events();
        changed
    }

    fn navigate(&mut self, cmd: Command) -> bool {
        let changed = self.controller.apply(cmd);
        if changed
            && cmd.is_navigation()
            && self.start_timer_on_navigation
            && !self.timer.is_running()
        {
            debug!("page change resumes the timer");
            self.timer.resume();
        }
        changed
    }

    fn dispatch_events(&mut self) {
        for event in self.events.try_iter() {
            self.audience.on_event(&event);
            self.console.on_event(&event);
        }
    }

    /// Paint finished renders and refresh the clock; returns surfaces painted
    pub fn pump(&mut self, now: Instant) -> usize {
        let deliveries = self.controller.poll_deliveries();
        let painted = self.route(deliveries);
        self.dispatch_events();
        self.console.poll_clock(&self.timer, now);
        painted
    }

    /// Block until every outstanding render is painted, or `timeout` passes.
    ///
    /// For hosts without an event loop; returns whether the pipeline went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.controller.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let deliveries = self.controller.wait_deliveries(remaining);
            self.route(deliveries);
        }
        self.dispatch_events();
        true
    }

    fn route(&mut self, deliveries: Vec<Delivery>) -> usize {
        let mut painted = 0;
        for delivery in deliveries {
            let presenter = match Role::for_tag(delivery.tag()) {
                Role::Audience => &mut self.audience,
                Role::Console => &mut self.console,
            };
            if presenter.on_delivery(delivery) {
                painted += 1;
            }
        }
        painted
    }

    #[must_use]
    pub fn controller(&self) -> &SyncController {
        &self.controller
    }

    #[must_use]
    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    #[must_use]
    pub fn audience(&self) -> &ViewPresenter {
        &self.audience
    }

    #[must_use]
    pub fn console(&self) -> &ViewPresenter {
        &self.console
    }

    /// Install the callback render workers run when a result is ready
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.controller.set_waker(waker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::ControllerConfig;
    use crate::render::{RenderScheduler, SchedulerConfig, SurfaceKind};
    use crate::test_utils::{ManualClock, RecordingDisplay, SyntheticDeck};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        session: Session,
        audience: RecordingDisplay,
        console: RecordingDisplay,
        clock: Arc<ManualClock>,
    }

    fn harness(pages: usize, start_timer_on_navigation: bool) -> Harness {
        let scheduler = RenderScheduler::new(
            Arc::new(SyntheticDeck::new(pages)),
            SchedulerConfig::default(),
        );
        let controller = SyncController::new(scheduler, false, ControllerConfig::default());
        let clock = Arc::new(ManualClock::new());
        let audience = RecordingDisplay::default();
        let console = RecordingDisplay::default();

        let mut session = Session::new(
            controller,
            TimerEngine::new(clock.clone()),
            ViewPresenter::audience(Box::new(audience.clone())),
            ViewPresenter::console(Box::new(console.clone())),
            start_timer_on_navigation,
        );
        for tag in ViewTag::ALL {
            session.handle(Input::Resize {
                tag,
                width: 40,
                height: 30,
            });
        }
        assert!(session.wait_idle(WAIT));

        Harness {
            session,
            audience,
            console,
            clock,
        }
    }

    #[test]
    fn resize_routes_to_owning_output() {
        let h = harness(3, false);
        assert_eq!(h.session.audience().viewport(ViewTag::Main), Some((40, 30)));
        assert_eq!(h.session.console().viewport(ViewTag::Thumbnail), Some((40, 30)));
        assert_eq!(h.session.audience().viewport(ViewTag::Thumbnail), None);

        assert_eq!(h.audience.last_paint(ViewTag::Main).and_then(|s| s.page()), Some(0));
        assert_eq!(
            h.console.last_paint(ViewTag::Thumbnail).and_then(|s| s.page()),
            Some(1)
        );
    }

    #[test]
    fn views_registered_on_the_controller_are_painted() {
        let scheduler = RenderScheduler::new(
            Arc::new(SyntheticDeck::new(3)),
            SchedulerConfig::default(),
        );
        let mut controller = SyncController::new(scheduler, false, ControllerConfig::default());
        controller.register_view(ViewTag::Main, 64, 48);
        let audience = RecordingDisplay::default();

        let mut session = Session::new(
            controller,
            TimerEngine::default(),
            ViewPresenter::audience(Box::new(audience.clone())),
            ViewPresenter::console(Box::new(RecordingDisplay::default())),
            false,
        );
        assert!(session.wait_idle(WAIT));

        let main = audience.last_paint(ViewTag::Main).expect("main painted");
        assert_eq!(main.size(), (64, 48));
        assert_eq!(session.audience().viewport(ViewTag::Main), Some((64, 48)));
    }

    #[test]
    fn page_entry_navigates_and_bad_entry_is_ignored() {
        let mut h = harness(5, false);
        assert!(h.session.handle(Input::PageEntry("4/5".to_string())));
        assert_eq!(h.session.controller().current_index(), 3);

        assert!(!h.session.handle(Input::PageEntry("four".to_string())));
        assert_eq!(h.session.controller().current_index(), 3);

        h.session.handle(Input::PageEntry("99".to_string()));
        assert_eq!(h.session.controller().current_index(), 4);
    }

    #[test]
    fn navigation_starts_timer() {
        let mut h = harness(3, true);
        assert!(!h.session.timer().has_started());

        h.session.handle(Input::Navigate(Command::ToggleBlank));
        assert!(!h.session.timer().has_started());

        h.session.handle(Input::Navigate(Command::Next));
        assert!(h.session.timer().is_running());

    }

    #[test]
    fn navigation_resumes_paused_timer() {
        let mut h = harness(4, true);
        h.session.handle(Input::Navigate(Command::Next));
        h.clock.advance(Duration::from_secs(10));
        h.session.handle(Input::Timer(TimerCommand::Pause));
        h.clock.advance(Duration::from_secs(30));

        h.session.handle(Input::Navigate(Command::Next));
        assert!(h.session.timer().is_running());
        h.clock.advance(Duration::from_secs(5));
        assert_eq!(h.session.timer().elapsed(), Duration::from_secs(15));

        // Staying on the same page leaves a pause alone
        h.session.handle(Input::Timer(TimerCommand::Pause));
        h.session.handle(Input::Navigate(Command::GoTo(2)));
        assert!(h.session.timer().is_paused());
    }

    #[test]
    fn timer_is_left_alone_when_auto_start_is_off() {
        let mut h = harness(3, false);
        h.session.handle(Input::Navigate(Command::Next));
        assert!(!h.session.timer().has_started());
    }

    #[test]
    fn blank_shows_black_frame_on_audience_only() {
        let mut h = harness(3, false);
        h.session.handle(Input::Navigate(Command::ToggleBlank));

        let last = h.audience.last_paint(ViewTag::Main).map(|s| s.kind);
        assert_eq!(last, Some(SurfaceKind::Blank));
        assert!(h.console.paints().iter().all(|(_, s)| s.kind != SurfaceKind::Blank));
        assert_eq!(h.session.controller().current_index(), 0);
    }

    #[test]
    fn pump_refreshes_clock_text() {
        let mut h = harness(3, false);
        h.session.handle(Input::Timer(TimerCommand::Start));
        h.clock.advance(Duration::from_secs(65));

        h.session.pump(Instant::now());
        let clocks = h.console.clocks();
        assert_eq!(clocks.last().map(|c| c.elapsed.as_str()), Some("01:05"));
    }
}
