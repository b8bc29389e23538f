//! Foreground render loop.
//!
//! Runs on the main thread. Each tick it drains at most one input event,
//! tracks the display schedule, advances when the slide is due and hands the
//! resulting [`Frame`] to the renderer, but only when it differs from the
//! last one drawn.

use std::fmt::Display;
use std::thread;
use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::events::InputEvent;
use crate::navigation::ItemId;
use crate::platform::display_power::DisplayPowerController;
use crate::render::overlay::compose;
use crate::render::{Frame, Renderer, ResolvedImage, resolve_image};
use crate::schedule::{DisplayOverride, PowerEdge};
use crate::slideshow::Slideshow;
use crate::tasks::power::PowerAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance,
    Recall,
    /// Re-resolve whatever is current, e.g. after a web navigation.
    Stay,
}

/// Outcome of [`resolve_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    pub shown: Option<T>,
    pub attempts: usize,
}

/// Resolve `first`, advancing past items that fail to resolve. Gives up after
/// `max_attempts` candidates or as soon as there is nothing left to show.
pub fn resolve_with_retry<T, E: Display>(
    first: Option<ItemId>,
    max_attempts: usize,
    mut advance: impl FnMut() -> Option<ItemId>,
    mut resolve: impl FnMut(&ItemId) -> Result<T, E>,
) -> Resolution<T> {
    let mut candidate = first;
    let mut attempts = 0;
    while let Some(id) = candidate {
        attempts += 1;
        match resolve(&id) {
            Ok(shown) => {
                return Resolution {
                    shown: Some(shown),
                    attempts,
                };
            }
            Err(err) => warn!(item = %id, attempt = attempts, error = %err, "skipping unreadable image"),
        }
        if attempts >= max_attempts {
            warn!(attempts, "too many unreadable images in a row; showing placeholder");
            break;
        }
        candidate = advance();
    }
    Resolution {
        shown: None,
        attempts,
    }
}

fn show(slideshow: &Slideshow, step: Step) -> Option<ResolvedImage> {
    let first = match step {
        Step::Advance => slideshow.advance(),
        Step::Recall => slideshow.navigator().recall(),
        Step::Stay => slideshow.current(),
    };
    let cfg = slideshow.settings();
    let library = slideshow.library();
    let resolution = resolve_with_retry(
        first,
        cfg.navigation.max_missing_retries,
        || slideshow.advance(),
        |id| resolve_image(&library, &cfg, id).map_err(|err| format!("{err:#}")),
    );
    match &resolution.shown {
        Some(image) => {
            debug!(item = %image.id, attempts = resolution.attempts, ?step, "slide resolved");
        }
        // nothing readable: status must not keep naming the vanished item
        None if resolution.attempts > 0 => slideshow.navigator().clear_current(),
        None => {}
    }
    resolution.shown
}

/// Drive the slideshow until cancelled. `input` may disconnect at any time;
/// the loop then falls back to sleeping between ticks.
pub fn run<R>(slideshow: &Slideshow, renderer: &mut R, input: &Receiver<InputEvent>) -> Result<()>
where
    R: Renderer + ?Sized,
{
    let cancel = slideshow.cancel_token().clone();
    let signals = slideshow.signals().clone();
    let display_power = slideshow.with_settings(|cfg| DisplayPowerController::from_options(&cfg.display));
    let mut power_edge = PowerEdge::default();
    let mut last_override = slideshow.display_override();
    let mut input_open = true;
    let mut step = Some(Step::Advance);
    let mut shown: Option<ResolvedImage> = None;
    let mut last_frame: Option<Frame> = None;

    info!("render loop started");
    while !cancel.is_cancelled() {
        let tick = slideshow.with_settings(|cfg| cfg.navigation.idle_tick);
        let event = if input_open {
            match input.recv_timeout(tick) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("input channel closed; ticking on a timer");
                    input_open = false;
                    None
                }
            }
        } else {
            thread::sleep(tick);
            None
        };

        match event {
            Some(InputEvent::Next) => step = Some(Step::Advance),
            Some(InputEvent::Previous) => step = Some(Step::Recall),
            Some(InputEvent::TogglePause) => {
                slideshow.toggle_pause();
            }
            Some(InputEvent::Quit) => {
                info!("quit requested from keyboard");
                cancel.cancel();
                break;
            }
            None => {}
        }

        let now = slideshow.local_now();
        let display_on = slideshow.display_on_at(now);
        let over = slideshow.display_override();
        if let Some(change) = power_edge.observe(display_on) {
            info!(on = change.on, initial = change.initial, "display power state");
            if let Some(ctl) = &display_power {
                if let Err(err) = ctl.set_power(change.on) {
                    warn!(error = ?err, "display power command failed");
                }
            }
            let scheduled = over == DisplayOverride::Auto && last_override == DisplayOverride::Auto;
            let shutdown = slideshow.with_settings(|cfg| cfg.display.shutdown_on_display_off);
            if !change.on && !change.initial && scheduled && shutdown {
                match slideshow.start_power_action(PowerAction::Shutdown, None) {
                    Ok(countdown) => info!(countdown, "display schedule ended; shutting down"),
                    Err(err) => warn!(error = %err, "could not start scheduled shutdown"),
                }
            }
        }
        last_override = over;

        if step.is_none() && display_on && slideshow.slide_due(Instant::now()) {
            step = Some(Step::Advance);
        }
        if signals.take_redraw() && step.is_none() {
            step = Some(Step::Stay);
        }
        if let Some(next) = step.take() {
            shown = show(slideshow, next);
            if next != Step::Stay {
                slideshow.restart_timer();
            }
        }

        let frame = if let Some(notice) = signals.notice() {
            Frame::Notice(notice)
        } else if !display_on {
            Frame::Blank
        } else {
            let weather = slideshow.weather();
            let overlay = slideshow
                .with_settings(|cfg| compose(&cfg.overlay, now, weather.as_ref(), shown.as_ref()));
            match &shown {
                Some(image) => Frame::Photo {
                    image: image.clone(),
                    overlay,
                },
                None => Frame::Placeholder(overlay),
            }
        };
        if last_frame.as_ref() != Some(&frame) {
            if let Err(err) = renderer.render(&frame) {
                warn!(error = ?err, "render failed");
            }
            last_frame = Some(frame);
        }
    }
    info!("render loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn missing_single_item_gives_up_at_ceiling() {
        let advances = Cell::new(0);
        let resolution: Resolution<()> = resolve_with_retry(
            Some(ItemId::from("x")),
            5,
            || {
                advances.set(advances.get() + 1);
                Some(ItemId::from("x"))
            },
            |_| Err("file vanished"),
        );
        assert_eq!(resolution.shown, None);
        assert_eq!(resolution.attempts, 5);
        assert_eq!(advances.get(), 4);
    }

    #[test]
    fn skips_to_first_readable_item() {
        let mut queue = vec![ItemId::from("ok.jpg"), ItemId::from("gone.jpg")];
        let resolution = resolve_with_retry(
            Some(ItemId::from("gone-too.jpg")),
            10,
            || queue.pop(),
            |id| {
                if id.as_str() == "ok.jpg" {
                    Ok(id.clone())
                } else {
                    Err("missing")
                }
            },
        );
        assert_eq!(resolution.shown, Some(ItemId::from("ok.jpg")));
        assert_eq!(resolution.attempts, 3);
    }

    #[test]
    fn empty_candidate_ends_immediately() {
        let resolution: Resolution<()> =
            resolve_with_retry(None, 10, || panic!("must not advance"), |_| Err("unused"));
        assert_eq!(resolution, Resolution { shown: None, attempts: 0 });
    }
}
