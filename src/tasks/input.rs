//! Keyboard input read line by line from a terminal on stdin.

use std::io::{self, BufRead, IsTerminal};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::events::InputEvent;

/// Spawn the stdin reader. Returns `None` when stdin is not a terminal,
/// in which case the render loop only reacts to the web and its timer.
pub fn spawn(events: Sender<InputEvent>) -> Result<Option<JoinHandle<()>>> {
    if !io::stdin().is_terminal() {
        debug!("stdin is not a terminal; keyboard input disabled");
        return Ok(None);
    }
    let handle = thread::Builder::new()
        .name("stdin-input".into())
        .spawn(move || read_events(io::stdin().lock(), &events))
        .context("failed to spawn stdin reader")?;
    Ok(Some(handle))
}

/// Forward commands from `reader` until EOF, then send `Quit`.
pub fn read_events<B: BufRead>(reader: B, events: &Sender<InputEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        };
        match InputEvent::from_key(&line) {
            Some(event) => {
                debug!(?event, "keyboard command");
                if events.send(event).is_err() || event == InputEvent::Quit {
                    return;
                }
            }
            None => debug!(input = %line.trim(), "ignored keyboard input"),
        }
    }
    info!("stdin closed; quitting");
    let _ = events.send(InputEvent::Quit);
}
