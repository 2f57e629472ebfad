use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::presentation::{ControllerConfig, NotesMode};
use crate::render::{
    DEFAULT_CACHE_PAGES, DEFAULT_PREFETCH_AHEAD, DEFAULT_PREFETCH_BEHIND, DEFAULT_WORKERS,
    SchedulerConfig,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "lectern";

/// Engine settings. Presentation state (page, timer) is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    /// Rendered surfaces kept in memory; 0 disables caching and prefetch
    #[serde(default = "default_cache_pages")]
    pub cache_pages: usize,

    #[serde(default = "default_prefetch_ahead")]
    pub prefetch_ahead: usize,

    #[serde(default = "default_prefetch_behind")]
    pub prefetch_behind: usize,

    #[serde(default = "default_clock_tick_ms")]
    pub clock_tick_ms: u64,

    #[serde(default = "default_true")]
    pub start_timer_on_navigation: bool,

    #[serde(default)]
    pub notes_mode: NotesMode,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_cache_pages() -> usize {
    DEFAULT_CACHE_PAGES
}

fn default_prefetch_ahead() -> usize {
    DEFAULT_PREFETCH_AHEAD
}

fn default_prefetch_behind() -> usize {
    DEFAULT_PREFETCH_BEHIND
}

fn default_clock_tick_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            render_workers: default_render_workers(),
            cache_pages: default_cache_pages(),
            prefetch_ahead: default_prefetch_ahead(),
            prefetch_behind: default_prefetch_behind(),
            clock_tick_ms: default_clock_tick_ms(),
            start_timer_on_navigation: true,
            notes_mode: NotesMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.render_workers,
            cache_pages: self.cache_pages,
        }
    }

    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            prefetch_ahead: self.prefetch_ahead,
            prefetch_behind: self.prefetch_behind,
            notes_mode: self.notes_mode,
        }
    }

    /// Console clock refresh interval, never below 10 ms
    #[must_use]
    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms.max(10))
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the default location.
///
/// A missing file is created with defaults; an unreadable one is reported and
/// defaults are used.
#[must_use]
pub fn load_settings(path: Option<&Path>) -> Settings {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        return settings;
    }

    load_settings_from_path(&path).unwrap_or_default()
}

fn load_settings_from_path(path: &Path) -> Option<Settings> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                Some(settings)
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                None
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            None
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Background render threads\n");
    content.push_str(&format!("render_workers: {}\n", settings.render_workers));
    content.push_str("# Rendered pages kept in memory (0 disables caching and prefetch)\n");
    content.push_str(&format!("cache_pages: {}\n", settings.cache_pages));
    content.push_str(&format!("prefetch_ahead: {}\n", settings.prefetch_ahead));
    content.push_str(&format!("prefetch_behind: {}\n", settings.prefetch_behind));
    content.push('\n');
    content.push_str("# Console clock refresh interval in milliseconds\n");
    content.push_str(&format!("clock_tick_ms: {}\n", settings.clock_tick_ms));
    content.push_str(&format!(
        "start_timer_on_navigation: {}\n",
        settings.start_timer_on_navigation
    ));
    content.push_str("# Split slides-with-notes pages: auto, on or off\n");
    content.push_str(&format!("notes_mode: \"{}\"\n", settings.notes_mode.as_str()));
    content.push_str("# off, error, warn, info, debug or trace\n");
    content.push_str(&format!("log_level: \"{}\"\n", settings.log_level));

    content
}
