// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Wires pad button changes to the cue dispatcher and the button LEDs.

use std::{error::Error, sync::Arc};

use tracing::{info, span, warn, Level};

use crate::{
    color::ButtonColor,
    cues::CueDispatcher,
    pad::{ButtonId, PressState, ToolbarButton},
    tracker::{ButtonChange, ButtonTracker, Channel},
};

/// Plays the cue named after each pressed button. While the stop modifier is held, releasing
/// a button stops its cue.
pub struct Launcher {
    tracker: ButtonTracker,
    dispatcher: Arc<CueDispatcher>,
    stop_modifier: ToolbarButton,
}

impl Launcher {
    pub fn new(
        tracker: ButtonTracker,
        dispatcher: Arc<CueDispatcher>,
        stop_modifier: ToolbarButton,
    ) -> Launcher {
        let handler_dispatcher = dispatcher.clone();
        tracker.on_change(
            Channel::All,
            Arc::new(move |tracker, change| {
                handle_change(tracker, &handler_dispatcher, stop_modifier, change)
            }),
        );

        Launcher {
            tracker,
            dispatcher,
            stop_modifier,
        }
    }

    pub fn tracker(&self) -> &ButtonTracker {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &Arc<CueDispatcher> {
        &self.dispatcher
    }

    pub fn stop_modifier(&self) -> ToolbarButton {
        self.stop_modifier
    }

    /// Starts tracking the pad. Returns the tracker's error if the pad couldn't be opened.
    pub fn start(&self) -> Result<(), Box<dyn Error>> {
        self.tracker.start();
        if !self.tracker.is_running() {
            return Err(self
                .tracker
                .last_error()
                .unwrap_or_else(|| format!("unable to start {}", self.tracker.pad()))
                .into());
        }
        info!(pad = %self.tracker.pad(), stop_modifier = %self.stop_modifier, "Launcher started.");
        Ok(())
    }

    /// Stops tracking and silences every sound.
    pub fn stop(&self) {
        self.tracker.stop();
        self.dispatcher.stop_all();
        info!("Launcher stopped.");
    }
}

fn handle_change(
    tracker: &ButtonTracker,
    dispatcher: &CueDispatcher,
    stop_modifier: ToolbarButton,
    change: &ButtonChange,
) {
    let span = span!(Level::DEBUG, "button change");
    let _enter = span.enter();

    let id = change.id();
    let modifier = ButtonId::Toolbar(stop_modifier);
    let stopping = tracker.is_active(modifier);

    if id != modifier {
        let color = if stopping {
            ButtonColor::Red
        } else {
            ButtonColor::Green
        };
        if let Err(e) = change.button().set_color(color) {
            warn!(button = %id, err = %e, "Unable to light button.");
        }
    }

    let cue = id.to_string();
    match change.state() {
        PressState::Down => {
            dispatcher.play_cue(&cue);
        }
        PressState::Up if stopping => dispatcher.stop_cue(&cue),
        PressState::Up => {}
    }
}
