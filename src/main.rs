use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use flume::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use simplelog::LevelFilter;

use lectern::presentation::{
    Command, ControllerConfig, Display, PageLabels, Role, SyncController, ViewPresenter,
};
use lectern::render::{PixelSurface, RenderScheduler, ViewTag};
use lectern::session::{Input, Session};
use lectern::timer::{ClockText, TimerCommand, TimerEngine};
use lectern::{document, logging, panic_handler, settings};

/// Width x height of an output, written `1920x1080`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Size {
    width: u32,
    height: u32,
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid dimension {v:?}: {e}"))
        };
        Ok(Self {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Parser, Debug)]
#[command(name = "lectern", version, about = "Headless shell for the lectern presentation engine", long_about = None)]
struct Cli {
    /// PDF file, or a directory of slide images
    document: PathBuf,

    /// Settings file (default: <config dir>/lectern/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render threads, overriding the settings file
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, default_value = "lectern.log")]
    log_file: PathBuf,

    /// Write every painted view to <dir>/<view>.png
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Audience (projector) output size
    #[arg(long, default_value = "1920x1080")]
    main_size: Size,

    /// Current slide area of the speaker console
    #[arg(long, default_value = "1280x800")]
    console_size: Size,

    /// Next slide area of the speaker console
    #[arg(long, default_value = "640x400")]
    thumb_size: Size,
}

/// What the shell remembers about the console for the `status` command
#[derive(Debug, Default)]
struct ConsoleStatus {
    labels: Option<PageLabels>,
    clock: Option<ClockText>,
}

/// Display that reports paints on stdout and optionally exports them as PNG
struct ShellDisplay {
    export_dir: Option<PathBuf>,
    status: Arc<Mutex<ConsoleStatus>>,
}

impl ShellDisplay {
    fn export(&self, tag: ViewTag, surface: &PixelSurface) {
        let Some(dir) = &self.export_dir else {
            return;
        };
        let path = dir.join(format!("{tag}.png"));
        match surface.to_rgb_image() {
            Some(image) => {
                if let Err(e) = image.save(&path) {
                    warn!("Failed to export {tag} view to {path:?}: {e}");
                }
            }
            None => warn!("{tag} surface has an inconsistent buffer, not exported"),
        }
    }
}

impl Display for ShellDisplay {
    fn paint(&mut self, tag: ViewTag, surface: &Arc<PixelSurface>) {
        let (width, height) = surface.size();
        println!("[{tag}] {:?} {width}x{height}", surface.kind);
        self.export(tag, surface);
    }

    fn show_labels(&mut self, labels: &PageLabels) {
        println!("page {} (next {})", labels.current, labels.next);
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .labels = Some(labels.clone());
    }

    fn show_clock(&mut self, clock: &ClockText) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clock = Some(clock.clone());
    }
}

enum ShellMessage {
    Line(String),
    /// A render result is waiting to be pumped
    Rendered,
    Closed,
}

enum ShellCommand {
    Input(Input),
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  n | next                 next page
  p | prev                 previous page
  g <n> | g <n>/<total>    go to page n
  home | end               first / last page
  b                        blank or restore the projector
  notes                    toggle notes mode
  t start|pause|resume|toggle|reset
  resize main|console|thumb WxH
  s | status               show page labels and clocks
  q | quit";

type Parsed = Result<Option<ShellCommand>, String>;

fn parse_command(line: &str) -> Parsed {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let navigate = |cmd: Command| -> Parsed { Ok(Some(ShellCommand::Input(Input::Navigate(cmd)))) };
    let timer = |cmd: TimerCommand| -> Parsed { Ok(Some(ShellCommand::Input(Input::Timer(cmd)))) };

    match (verb, arg) {
        ("n" | "next", _) => navigate(Command::Next),
        ("p" | "prev" | "previous", _) => navigate(Command::Previous),
        ("home", _) => navigate(Command::First),
        ("end", _) => navigate(Command::Last),
        ("b" | "blank", _) => navigate(Command::ToggleBlank),
        ("notes", _) => navigate(Command::ToggleNotes),
        ("g" | "goto", Some(entry)) => Ok(Some(ShellCommand::Input(Input::PageEntry(
            entry.to_string(),
        )))),
        ("t" | "timer", Some("start")) => timer(TimerCommand::Start),
        ("t" | "timer", Some("pause")) => timer(TimerCommand::Pause),
        ("t" | "timer", Some("resume")) => timer(TimerCommand::Resume),
        ("t" | "timer", Some("toggle") | None) => timer(TimerCommand::TogglePause),
        ("t" | "timer", Some("reset")) => timer(TimerCommand::Reset),
        ("resize", Some(view)) => {
            let tag = match view {
                "main" => ViewTag::Main,
                "console" => ViewTag::Secondary,
                "thumb" | "thumbnail" => ViewTag::Thumbnail,
                other => return Err(format!("unknown view {other:?}")),
            };
            let size: Size = words
                .next()
                .ok_or("resize needs a size, e.g. 800x600")?
                .parse()?;
            Ok(Some(ShellCommand::Input(Input::Resize {
                tag,
                width: size.width,
                height: size.height,
            })))
        }
        ("s" | "status", _) => Ok(Some(ShellCommand::Status)),
        ("h" | "help" | "?", _) => Ok(Some(ShellCommand::Help)),
        ("q" | "quit" | "exit", _) => Ok(Some(ShellCommand::Quit)),
        _ => Err(format!("unknown command {line:?} (try 'help')")),
    }
}

fn spawn_stdin_reader(tx: Sender<ShellMessage>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(ShellMessage::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(ShellMessage::Closed);
    });
}

fn print_status(session: &Session, status: &Mutex<ConsoleStatus>) {
    let status = status.lock().unwrap_or_else(PoisonError::into_inner);
    let controller = session.controller();
    let labels = status
        .labels
        .clone()
        .unwrap_or_else(|| PageLabels::new(controller.current_index(), controller.page_count()));
    let clock = status
        .clock
        .clone()
        .unwrap_or_else(|| session.timer().clock_text());

    println!(
        "page {} (next {}) | elapsed {} | clock {}{}",
        labels.current,
        labels.next,
        clock.elapsed,
        clock.wall,
        if controller.is_blanked() { " | blanked" } else { "" }
    );
}

fn run_shell(
    mut session: Session,
    messages: Receiver<ShellMessage>,
    status: &Mutex<ConsoleStatus>,
    tick: std::time::Duration,
) {
    println!("{HELP}");
    loop {
        let _ = std::io::stdout().flush();

        match messages.recv_timeout(tick) {
            Ok(ShellMessage::Line(line)) => match parse_command(&line) {
                Ok(Some(ShellCommand::Input(input))) => {
                    session.handle(input);
                }
                Ok(Some(ShellCommand::Status)) => print_status(&session, status),
                Ok(Some(ShellCommand::Help)) => println!("{HELP}"),
                Ok(Some(ShellCommand::Quit)) => break,
                Ok(None) => {}
                Err(e) => println!("{e}"),
            },
            Ok(ShellMessage::Rendered) | Err(RecvTimeoutError::Timeout) => {}
            Ok(ShellMessage::Closed) | Err(RecvTimeoutError::Disconnected) => break,
        }

        session.pump(Instant::now());
    }
}

fn prepare_export_dir(dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create export directory {dir:?}"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_file_logger(&cli.log_file).context("failed to initialize logging")?;
    panic_handler::initialize_panic_handler();

    let settings = settings::load_settings(cli.config.as_deref());
    let level = logging::parse_level(&settings.log_level).unwrap_or_else(|| {
        warn!("Unknown log level {:?}, using info", settings.log_level);
        LevelFilter::Info
    });
    log::set_max_level(level);

    info!("Starting lectern");

    let doc = document::load(&cli.document).inspect_err(|e| error!("{e}"))?;
    prepare_export_dir(cli.export_dir.as_deref())?;

    let mut scheduler_config = settings.scheduler_config();
    if let Some(workers) = cli.workers {
        scheduler_config.workers = workers;
    }
    let controller_config: ControllerConfig = settings.controller_config();

    let scheduler = RenderScheduler::new(doc.source.clone(), scheduler_config);
    let controller = SyncController::new(scheduler, doc.has_notes, controller_config);

    let status = Arc::new(Mutex::new(ConsoleStatus::default()));
    let display = |status: &Arc<Mutex<ConsoleStatus>>| {
        Box::new(ShellDisplay {
            export_dir: cli.export_dir.clone(),
            status: status.clone(),
        })
    };
    let audience = ViewPresenter::new(Role::Audience, display(&status), settings.clock_tick());
    let console = ViewPresenter::new(Role::Console, display(&status), settings.clock_tick());

    let mut session = Session::new(
        controller,
        TimerEngine::default(),
        audience,
        console,
        settings.start_timer_on_navigation,
    );

    let (tx, rx) = flume::unbounded();
    let waker_tx = tx.clone();
    session.set_waker(move || {
        let _ = waker_tx.send(ShellMessage::Rendered);
    });

    if let Some(title) = &doc.title {
        println!("{title}");
    }
    for (tag, size) in [
        (ViewTag::Main, cli.main_size),
        (ViewTag::Secondary, cli.console_size),
        (ViewTag::Thumbnail, cli.thumb_size),
    ] {
        info!("{tag} view at {size}");
        session.handle(Input::Resize {
            tag,
            width: size.width,
            height: size.height,
        });
    }

    spawn_stdin_reader(tx);
    run_shell(session, rx, &status, settings.clock_tick());

    info!("Shutting down lectern");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parses_both_separators() {
        assert_eq!(
            "800x600".parse::<Size>(),
            Ok(Size {
                width: 800,
                height: 600
            })
        );
        assert_eq!("64X48".parse::<Size>().map(|s| s.to_string()), Ok("64x48".to_string()));
        assert!("800".parse::<Size>().is_err());
        assert!("axb".parse::<Size>().is_err());
    }

    #[test]
    fn shell_commands_map_to_inputs() {
        assert!(matches!(
            parse_command("n"),
            Ok(Some(ShellCommand::Input(Input::Navigate(Command::Next))))
        ));
        assert!(matches!(
            parse_command("g 3/10"),
            Ok(Some(ShellCommand::Input(Input::PageEntry(ref e)))) if e == "3/10"
        ));
        assert!(matches!(
            parse_command("resize console 300x200"),
            Ok(Some(ShellCommand::Input(Input::Resize {
                tag: ViewTag::Secondary,
                width: 300,
                height: 200
            })))
        ));
        assert!(matches!(
            parse_command("t pause"),
            Ok(Some(ShellCommand::Input(Input::Timer(TimerCommand::Pause))))
        ));
        assert!(matches!(parse_command("   "), Ok(None)));
        assert!(matches!(parse_command("q"), Ok(Some(ShellCommand::Quit))));
        assert!(parse_command("resize projector 1x1").is_err());
        assert!(parse_command("dance").is_err());
    }
}
