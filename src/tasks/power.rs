//! Countdown shutdown / restart that can be cancelled from the web.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::platform::display_power::CommandRunner;
use crate::slideshow::DisplaySignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Shutdown,
    Restart,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Restart => "restart",
        }
    }

    pub fn countdown_notice(&self, remaining: u64) -> String {
        match self {
            Self::Shutdown => format!("Shutting down in {remaining} seconds..."),
            Self::Restart => format!("Restarting in {remaining} seconds..."),
        }
    }

    pub fn final_notice(&self) -> &'static str {
        match self {
            Self::Shutdown => "Shutting down...",
            Self::Restart => "Restarting...",
        }
    }

    pub fn cancelled_notice(&self) -> &'static str {
        match self {
            Self::Shutdown => "Shutdown cancelled",
            Self::Restart => "Restart cancelled",
        }
    }
}

#[derive(Debug)]
struct Pending {
    id: u64,
    action: PowerAction,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    grace: Duration,
    tick: Duration,
    linger: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(500),
            tick: Duration::from_secs(1),
            linger: Duration::from_secs(1),
        }
    }
}

/// At most one power action runs at a time.
pub struct PowerControl {
    runtime: Handle,
    runner: CommandRunner,
    signals: Arc<DisplaySignals>,
    pending: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
    pacing: Pacing,
}

impl std::fmt::Debug for PowerControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerControl")
            .field("pending", &self.in_progress())
            .finish_non_exhaustive()
    }
}

fn lock(pending: &Mutex<Option<Pending>>) -> MutexGuard<'_, Option<Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PowerControl {
    pub fn new(runtime: Handle, runner: CommandRunner, signals: Arc<DisplaySignals>) -> Self {
        Self {
            runtime,
            runner,
            signals,
            pending: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            pacing: Pacing::default(),
        }
    }

    /// Shrink the countdown pacing; for tests.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.pacing = Pacing {
            grace: tick / 2,
            tick,
            linger: tick,
        };
        self
    }

    pub fn in_progress(&self) -> Option<PowerAction> {
        lock(&self.pending).as_ref().map(|p| p.action)
    }

    /// Start counting down `countdown` seconds, then run `command`.
    pub fn start(&self, action: PowerAction, countdown: u64, command: String) -> Result<(), Error> {
        let token = CancellationToken::new();
        let id = {
            let mut pending = lock(&self.pending);
            if pending.is_some() {
                return Err(Error::PowerActionBusy);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *pending = Some(Pending {
                id,
                action,
                cancel: token.clone(),
            });
            id
        };
        info!(action = action.as_str(), countdown, "power action scheduled");
        self.runtime.spawn(run_countdown(
            Countdown {
                id,
                action,
                seconds: countdown,
                command,
                token,
            },
            Arc::clone(&self.pending),
            Arc::clone(&self.signals),
            Arc::clone(&self.runner),
            self.pacing,
        ));
        Ok(())
    }

    /// Abort the running countdown.
    pub fn cancel(&self) -> Result<PowerAction, Error> {
        let pending = lock(&self.pending).take().ok_or(Error::NoPowerAction)?;
        pending.cancel.cancel();
        info!(action = pending.action.as_str(), "power action cancelled");
        Ok(pending.action)
    }
}

struct Countdown {
    id: u64,
    action: PowerAction,
    seconds: u64,
    command: String,
    token: CancellationToken,
}

async fn run_countdown(
    job: Countdown,
    pending: Arc<Mutex<Option<Pending>>>,
    signals: Arc<DisplaySignals>,
    runner: CommandRunner,
    pacing: Pacing,
) {
    let Countdown {
        id,
        action,
        seconds,
        command,
        token,
    } = job;

    let mut wait = pacing.grace;
    let mut remaining = seconds;
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                signals.set_notice(Some(action.cancelled_notice().to_string()));
                sleep(pacing.linger).await;
                if lock(&pending).is_none() {
                    signals.set_notice(None);
                }
                return;
            }
            _ = sleep(wait) => {}
        }
        if remaining == 0 {
            break;
        }
        signals.set_notice(Some(action.countdown_notice(remaining)));
        remaining -= 1;
        wait = pacing.tick;
    }

    signals.set_notice(Some(action.final_notice().to_string()));
    info!(action = action.as_str(), command = %command, "running power command");
    let outcome = tokio::task::spawn_blocking(move || runner(command.as_str())).await;
    let failed = match outcome {
        Ok(Ok(())) => false,
        Ok(Err(err)) => {
            error!(action = action.as_str(), error = ?err, "power command failed");
            true
        }
        Err(err) => {
            error!(action = action.as_str(), error = %err, "power command task panicked");
            true
        }
    };
    {
        let mut guard = lock(&pending);
        if guard.as_ref().is_some_and(|p| p.id == id) {
            *guard = None;
        } else {
            warn!(action = action.as_str(), "power action state replaced while running");
        }
    }
    if failed {
        signals.set_notice(None);
    }
}
