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

//! The grid controller: button lookup, live button state, LEDs, and press events.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::color::{self, Brightness, ButtonColor};

mod button;
mod launchpad;
pub mod mock;

pub use button::{ButtonId, ChannelKind, PressState, RawButtonEvent, SideButton, ToolbarButton};
pub(crate) use button::ButtonCell;

/// Errors raised by a pad device.
#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("no MIDI port found matching '{0}'")]
    PortNotFound(String),

    #[error("MIDI initialization failed: {0}")]
    Init(#[from] midir::InitError),

    #[error("MIDI connection failed: {0}")]
    Connect(String),

    #[error("MIDI send failed: {0}")]
    Send(#[from] midir::SendError),

    #[error("pad is not open")]
    NotOpen,

    #[error("unrecognized button identity '{0}'")]
    UnrecognizedIdentity(String),

    #[error("{0}")]
    Device(String),
}

/// A handle to a single button.
pub trait Button: Send + Sync {
    /// Returns the identity of this button.
    fn id(&self) -> ButtonId;

    /// Returns the state the hardware last reported for this button.
    fn state(&self) -> PressState;

    /// Returns the current (red, green) LED brightness.
    fn brightness(&self) -> (Brightness, Brightness);

    /// Sets the LED brightness.
    fn set_brightness(&self, red: Brightness, green: Brightness) -> Result<(), PadError>;

    /// Returns the current LED color.
    fn color(&self) -> ButtonColor {
        let (red, green) = self.brightness();
        color::color_for(red, green)
    }

    /// Lights the button with the given color.
    fn set_color(&self, color: ButtonColor) -> Result<(), PadError> {
        let (red, green) = color::levels_for(color);
        self.set_brightness(red, green)
    }
}

/// A press-event listener.
pub type Listener = Arc<dyn Fn(RawButtonEvent) + Send + Sync>;

/// Identifies a listener registered with [`Pad::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A grid controller.
pub trait Pad: fmt::Display + Send + Sync {
    /// Connects to the device.
    fn open(&self) -> Result<(), PadError>;

    /// Disconnects from the device. Listeners stay registered.
    fn close(&self);

    /// Turns off every LED.
    fn reset(&self) -> Result<(), PadError>;

    /// Registers a listener for press events. Listeners run in registration order on the
    /// device's input thread.
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Removes a listener.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Looks up a button. Returns None for identities that don't exist on the device.
    fn button(&self, id: ButtonId) -> Option<Arc<dyn Button>>;

    /// Returns every button on the device.
    fn buttons(&self) -> Vec<Arc<dyn Button>>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Pad>, PadError>;
}

/// An ordered list of press-event listeners.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Calls every listener with the event. The list is copied first so listeners may
    /// subscribe or unsubscribe while being notified.
    pub(crate) fn notify(&self, event: RawButtonEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Lists the MIDI input ports that a pad could be opened on.
pub fn list_devices() -> Result<Vec<String>, PadError> {
    launchpad::list()
}

/// Gets a pad with the given name. Names starting with "mock" return a mock pad.
pub fn get_device(name: &str) -> Arc<dyn Pad> {
    if name.starts_with("mock") {
        return Arc::new(mock::Pad::get(name));
    }

    Arc::new(launchpad::Launchpad::get(name))
}
