//! The shared slideshow handle.
//!
//! One `Arc<Slideshow>` is built in `main` and handed to the render loop, the
//! web server and the background tasks. Navigation goes through the
//! [`Navigator`] lock; everything the render loop must notice without being
//! called directly (redraw requests, notices) lives in [`DisplaySignals`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::error::Error;
use crate::navigation::{ItemId, ItemSource, NavigationSnapshot, Navigator};
use crate::scan::Library;
use crate::schedule::{self, DisplayOverride, DisplaySchedule};
use crate::settings::{self, SettingChange, SettingsUpdate};
use crate::tasks::power::{PowerAction, PowerControl};
use crate::weather::WeatherReport;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Flags the render loop polls once per tick.
#[derive(Debug, Default)]
pub struct DisplaySignals {
    redraw: AtomicBool,
    notice: Mutex<Option<String>>,
}

impl DisplaySignals {
    pub fn request_redraw(&self) {
        self.redraw.store(true, Ordering::Release);
    }

    /// Consume a pending redraw request.
    pub fn take_redraw(&self) -> bool {
        self.redraw.swap(false, Ordering::AcqRel)
    }

    /// Show (or clear) a full-screen notice.
    pub fn set_notice(&self, notice: Option<String>) {
        *lock(&self.notice) = notice;
        self.request_redraw();
    }

    pub fn notice(&self) -> Option<String> {
        lock(&self.notice).clone()
    }
}

/// Time a slide has been visible, not counting paused stretches.
#[derive(Debug, Clone)]
pub struct SlideTimer {
    delay: Duration,
    shown_at: Instant,
    paused_at: Option<Instant>,
    paused_for: Duration,
}

impl SlideTimer {
    pub fn new(delay: Duration, now: Instant) -> Self {
        Self {
            delay,
            shown_at: now,
            paused_at: None,
            paused_for: Duration::ZERO,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let paused_now = self
            .paused_at
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
        now.saturating_duration_since(self.shown_at)
            .saturating_sub(self.paused_for + paused_now)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.delay.saturating_sub(self.elapsed(now))
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.paused_at.is_none() && self.elapsed(now) >= self.delay
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Start timing a new slide; a pause stays in effect.
    pub fn restart(&mut self, now: Instant) {
        self.shown_at = now;
        self.paused_for = Duration::ZERO;
        if self.paused_at.is_some() {
            self.paused_at = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(at) = self.paused_at.take() {
            self.paused_for += now.saturating_duration_since(at);
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Outcome of a settings update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSettings {
    pub changes: Vec<SettingChange>,
    pub saved: bool,
}

pub struct Slideshow {
    navigator: Navigator,
    library: RwLock<Library>,
    settings: RwLock<Configuration>,
    config_path: Option<PathBuf>,
    signals: Arc<DisplaySignals>,
    timer: Mutex<SlideTimer>,
    display_override: Mutex<DisplayOverride>,
    weather: RwLock<Option<WeatherReport>>,
    weather_changed: Notify,
    library_changed: Notify,
    power: PowerControl,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Slideshow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slideshow")
            .field("navigation", &self.navigator.snapshot())
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

impl Slideshow {
    pub fn new(
        cfg: Configuration,
        config_path: Option<PathBuf>,
        signals: Arc<DisplaySignals>,
        power: PowerControl,
        cancel: CancellationToken,
    ) -> Self {
        let library = Library::from_config(&cfg);
        let navigator = Navigator::new(library.discovery_order(), cfg.navigation.shuffle_seed);
        Self {
            navigator,
            library: RwLock::new(library),
            timer: Mutex::new(SlideTimer::new(cfg.delay(), Instant::now())),
            settings: RwLock::new(cfg),
            config_path,
            signals,
            display_override: Mutex::new(DisplayOverride::Auto),
            weather: RwLock::new(None),
            weather_changed: Notify::new(),
            library_changed: Notify::new(),
            power,
            cancel,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn library(&self) -> Library {
        read(&self.library).clone()
    }

    pub fn settings(&self) -> Configuration {
        read(&self.settings).clone()
    }

    pub fn with_settings<R>(&self, f: impl FnOnce(&Configuration) -> R) -> R {
        f(&read(&self.settings))
    }

    pub fn signals(&self) -> &Arc<DisplaySignals> {
        &self.signals
    }

    pub fn power(&self) -> &PowerControl {
        &self.power
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn weather_changed(&self) -> &Notify {
        &self.weather_changed
    }

    pub fn library_changed(&self) -> &Notify {
        &self.library_changed
    }

    pub fn request_redraw(&self) {
        self.signals.request_redraw();
    }

    /// Scan the library and queue whatever is new. Blocking.
    pub fn rescan(&self) -> usize {
        let batch = self.library().scan();
        let added = self.navigator.discover(batch);
        info!(added, "library rescan");
        added
    }

    /// Advance without touching the timer or the redraw flag; used by the
    /// render loop, which redraws on its own. May scan the library.
    pub fn advance(&self) -> Option<ItemId> {
        let library = self.library();
        self.navigator.advance(&library)
    }

    /// Advance on behalf of a remote caller. May scan the library.
    pub fn next(&self) -> Option<ItemId> {
        let current = self.advance();
        self.restart_timer();
        self.signals.request_redraw();
        current
    }

    pub fn previous(&self) -> Option<ItemId> {
        let current = self.navigator.recall();
        self.restart_timer();
        self.signals.request_redraw();
        current
    }

    pub fn current(&self) -> Option<ItemId> {
        self.navigator.current()
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.navigator.snapshot()
    }

    /// Queue a freshly uploaded file so it shows up without a rescan.
    pub fn discover_upload(&self, file_name: &str) {
        let added = self.navigator.discover(vec![Library::upload_id(file_name)]);
        debug!(file = file_name, added, "upload queued");
        self.signals.request_redraw();
    }

    pub fn restart_timer(&self) {
        lock(&self.timer).restart(Instant::now());
    }

    pub fn slide_due(&self, now: Instant) -> bool {
        lock(&self.timer).is_due(now)
    }

    pub fn time_remaining(&self, now: Instant) -> Duration {
        lock(&self.timer).remaining(now)
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.timer).is_paused()
    }

    /// Flip pause; returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        let now = Instant::now();
        let paused = {
            let mut timer = lock(&self.timer);
            if timer.is_paused() {
                timer.resume(now);
            } else {
                timer.pause(now);
            }
            timer.is_paused()
        };
        info!(paused, "slideshow pause toggled");
        self.signals.request_redraw();
        paused
    }

    pub fn display_override(&self) -> DisplayOverride {
        *lock(&self.display_override)
    }

    pub fn set_display_override(&self, over: DisplayOverride) {
        *lock(&self.display_override) = over;
        info!(?over, "display override set");
        self.signals.request_redraw();
    }

    /// Current wall-clock time in the configured zone.
    pub fn local_now(&self) -> NaiveDateTime {
        schedule::local_now(self.with_settings(|cfg| cfg.display.timezone))
    }

    /// Whether the display should be lit at `now` (schedule plus override).
    pub fn display_on_at(&self, now: NaiveDateTime) -> bool {
        let schedule = self.with_settings(|cfg| DisplaySchedule::from_options(&cfg.display));
        schedule::display_on(self.display_override(), &schedule, now.time())
    }

    pub fn weather(&self) -> Option<WeatherReport> {
        read(&self.weather).clone()
    }

    pub fn set_weather(&self, report: WeatherReport) {
        *write(&self.weather) = Some(report);
        self.signals.request_redraw();
    }

    /// Apply a partial settings update, reacting to what changed: library
    /// changes restart navigation from a fresh scan, location changes wake
    /// the weather task. Blocking when the library is rescanned.
    pub fn apply_settings(&self, update: &SettingsUpdate) -> Result<AppliedSettings, Error> {
        let (changes, next) = {
            let mut current = write(&self.settings);
            let mut next = current.clone();
            let changes = settings::apply(&mut next, update)?;
            let next = next
                .validated()
                .map_err(|err| Error::InvalidSettings(format!("{err:#}")))?;
            *current = next.clone();
            (changes, next)
        };
        for change in &changes {
            info!(key = change.key, old = %change.old, new = %change.new, "setting changed");
        }

        if changes.iter().any(|c| c.key == "delay_seconds") {
            lock(&self.timer).set_delay(next.delay());
        }
        if changes.iter().any(SettingChange::affects_library) {
            let library = Library::from_config(&next);
            *write(&self.library) = library.clone();
            let batch = library.scan();
            let shown = self
                .navigator
                .restart_with(library.discovery_order(), batch);
            info!(current = ?shown, "navigation restarted after library change");
            self.restart_timer();
            self.library_changed.notify_waiters();
        }
        if changes.iter().any(SettingChange::affects_weather) {
            self.weather_changed.notify_one();
        }
        if !changes.is_empty() {
            self.signals.request_redraw();
        }

        let saved = if update.save_to_config == Some(true) {
            self.persist(&next)?;
            true
        } else {
            false
        };
        Ok(AppliedSettings { changes, saved })
    }

    fn persist(&self, cfg: &Configuration) -> Result<(), Error> {
        let Some(path) = &self.config_path else {
            return Err(Error::InvalidSettings(
                "no configuration file to save to".into(),
            ));
        };
        cfg.save_yaml_file(path)?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Start a shutdown or restart, defaulting the countdown from settings.
    pub fn start_power_action(&self, action: PowerAction, countdown: Option<u64>) -> Result<u64, Error> {
        let (command, default_countdown) = self.with_settings(|cfg| {
            let command = match action {
                PowerAction::Shutdown => cfg.power.shutdown_command.clone(),
                PowerAction::Restart => cfg.power.restart_command.clone(),
            };
            (command, cfg.display.shutdown_countdown_seconds)
        });
        let countdown = countdown.unwrap_or(default_countdown);
        self.power.start(action, countdown, command)?;
        Ok(countdown)
    }

    pub fn cancel_power_action(&self) -> Result<PowerAction, Error> {
        self.power.cancel()
    }
}
