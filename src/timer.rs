//! Presentation timer
//!
//! Elapsed time is always derived from stored timestamps (start, pause start,
//! total paused) rather than accumulated ticks, so polling cadence, scheduling
//! jitter or a missed tick never make it drift. Timestamps are wall time, so
//! time spent with the machine suspended counts as presentation time.

use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Utc};
use log::debug;

/// Source of timestamps for the timer
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
///
/// Monotonic clocks stop while the machine sleeps; the wall clock keeps going.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.shift(TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX));
    }

    /// Step backwards, like a wall clock corrected by NTP
    pub fn rewind(&self, by: Duration) {
        self.shift(-TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX));
    }

    fn shift(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(moved) = now.checked_add_signed(delta) {
            *now = moved;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Non-negative span between two timestamps
fn span(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

/// Timer commands coming from the input layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Resume,
    TogglePause,
    Reset,
}

/// Stored timestamps; elapsed time is a pure function of these and "now"
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerState {
    started_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    paused_total: Duration,
}

/// Text shown by the console's time labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockText {
    /// Elapsed presentation time, `MM:SS` with a ` (pause)` suffix when paused
    pub elapsed: String,
    /// Local wall clock, `HH:MM:SS`
    pub wall: String,
}

pub struct TimerEngine {
    clock: Arc<dyn Clock>,
    state: TimerState,
    /// Highest reading handed out since the last reset
    floor: Cell<Duration>,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TimerEngine {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: TimerState::default(),
            floor: Cell::new(Duration::ZERO),
        }
    }

    pub fn apply(&mut self, cmd: TimerCommand) {
        match cmd {
            TimerCommand::Start => self.start(),
            TimerCommand::Pause => self.pause(),
            TimerCommand::Resume => self.resume(),
            TimerCommand::TogglePause => self.toggle_pause(),
            TimerCommand::Reset => self.reset(),
        }
    }

    /// Start counting. No-op while running; resumes if paused.
    pub fn start(&mut self) {
        match self.state.started_at {
            None => {
                self.state = TimerState {
                    started_at: Some(self.clock.now()),
                    paused_at: None,
                    paused_total: Duration::ZERO,
                };
            }
            Some(_) => self.resume(),
        }
    }

    /// Freeze the elapsed time. No-op unless running.
    pub fn pause(&mut self) {
        if self.is_running() {
            self.state.paused_at = Some(self.clock.now());
        }
    }

    /// Continue after a pause. No-op while running; starts a timer that never ran.
    pub fn resume(&mut self) {
        if self.state.started_at.is_none() {
            self.start();
            return;
        }
        if let Some(paused_at) = self.state.paused_at.take() {
            let now = self.clock.now();
            self.state.paused_total += span(paused_at, now);
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.is_running() {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Zero the elapsed time, keeping the running/paused status
    pub fn reset(&mut self) {
        if self.state.started_at.is_none() {
            return;
        }
        let now = self.clock.now();
        self.state = TimerState {
            started_at: Some(now),
            paused_at: self.state.paused_at.map(|_| now),
            paused_total: Duration::ZERO,
        };
        self.floor.set(Duration::ZERO);
    }

    /// Time since start minus time spent paused.
    ///
    /// Never decreases between resets: if the wall clock is stepped back, the
    /// reading holds until the clock catches up.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let Some(started_at) = self.state.started_at else {
            return Duration::ZERO;
        };
        let end = self.state.paused_at.unwrap_or_else(|| self.clock.now());
        let reading = span(started_at, end).saturating_sub(self.state.paused_total);

        let floor = self.floor.get();
        if reading < floor {
            debug!("wall clock went back; holding timer at {floor:?}");
            return floor;
        }
        self.floor.set(reading);
        reading
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.started_at.is_some() && self.state.paused_at.is_none()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused_at.is_some()
    }

    #[must_use]
    pub fn has_started(&self) -> bool {
        self.state.started_at.is_some()
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Labels for the console, using the local wall clock
    #[must_use]
    pub fn clock_text(&self) -> ClockText {
        self.clock_text_at(Local::now())
    }

    #[must_use]
    pub fn clock_text_at(&self, wall: DateTime<Local>) -> ClockText {
        ClockText {
            elapsed: format_elapsed(self.elapsed(), self.is_paused() || !self.has_started()),
            wall: format_wall_clock(wall),
        }
    }
}

/// `MM:SS`; minutes keep counting past 59
#[must_use]
pub fn format_elapsed(elapsed: Duration, paused: bool) -> String {
    let secs = elapsed.as_secs();
    let text = format!("{:02}:{:02}", secs / 60, secs % 60);
    if paused {
        format!("{text} (pause)")
    } else {
        text
    }
}

#[must_use]
pub fn format_wall_clock(wall: DateTime<Local>) -> String {
    wall.format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> (TimerEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (TimerEngine::new(clock.clone()), clock)
    }

    #[test]
    fn not_started_reads_zero() {
        let (timer, clock) = engine();
        clock.advance(Duration::from_secs(30));
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(!timer.has_started());
    }

    #[test]
    fn elapsed_tracks_clock_while_running() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(3));
        assert_eq!(timer.elapsed(), Duration::from_secs(3));
        clock.advance(Duration::from_millis(250));
        assert_eq!(timer.elapsed(), Duration::from_millis(3250));
    }

    #[test]
    fn start_is_idempotent_once_running() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(5));
        timer.start();
        assert_eq!(timer.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn paused_timer_is_frozen() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(10));
        timer.pause();
        clock.advance(Duration::from_secs(60));
        assert_eq!(timer.elapsed(), Duration::from_secs(10));

        // Pausing twice is harmless
        timer.pause();
        clock.advance(Duration::from_secs(5));
        assert_eq!(timer.elapsed(), Duration::from_secs(10));

        timer.resume();
        clock.advance(Duration::from_secs(2));
        assert_eq!(timer.elapsed(), Duration::from_secs(12));
    }

    #[test]
    fn pause_resume_without_time_passing_is_unchanged() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(7));
        let before = timer.elapsed();
        timer.pause();
        timer.resume();
        assert_eq!(timer.elapsed(), before);
    }

    #[test]
    fn resume_while_running_is_noop() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(4));
        timer.resume();
        clock.advance(Duration::from_secs(1));
        assert_eq!(timer.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn reset_zeroes_and_keeps_status() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(90));
        timer.reset();
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(timer.is_running());

        timer.pause();
        clock.advance(Duration::from_secs(3));
        timer.reset();
        assert!(timer.is_paused());
        clock.advance(Duration::from_secs(3));
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }

    #[test]
    fn toggle_pause_flips_and_starts() {
        let (mut timer, clock) = engine();
        timer.toggle_pause();
        assert!(timer.is_running());
        clock.advance(Duration::from_secs(1));
        timer.apply(TimerCommand::TogglePause);
        assert!(timer.is_paused());
    }

    #[test]
    fn clock_stepped_back_never_lowers_elapsed() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(30));
        assert_eq!(timer.elapsed(), Duration::from_secs(30));

        clock.rewind(Duration::from_secs(20));
        assert_eq!(timer.elapsed(), Duration::from_secs(30));

        clock.advance(Duration::from_secs(25));
        assert_eq!(timer.elapsed(), Duration::from_secs(35));

        timer.reset();
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }

    #[test]
    fn time_asleep_counts_as_elapsed() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(60));
        let _ = timer.elapsed();

        // No polls while suspended; the next read sees the whole gap
        clock.advance(Duration::from_secs(600));
        assert_eq!(timer.elapsed(), Duration::from_secs(660));
    }

    #[test]
    fn system_clock_reads_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        let after = Utc::now();
        assert!(before <= now && now <= after);
    }

    #[test]
    fn elapsed_text_formats() {
        assert_eq!(format_elapsed(Duration::from_secs(0), false), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(75), false), "01:15");
        assert_eq!(format_elapsed(Duration::from_secs(3725), true), "62:05 (pause)");
    }

    #[test]
    fn clock_text_uses_wall_time() {
        let (mut timer, clock) = engine();
        timer.start();
        clock.advance(Duration::from_secs(61));
        let wall = Local
            .with_ymd_and_hms(2024, 5, 1, 9, 4, 7)
            .single()
            .expect("unambiguous local time");

        let text = timer.clock_text_at(wall);
        assert_eq!(text.elapsed, "01:01");
        assert_eq!(text.wall, "09:04:07");
    }
}
