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
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::color::Brightness;

use super::{
    Button, ButtonCell, ButtonId, Listener, PadError, PressState, RawButtonEvent, SubscriptionId,
    Subscribers,
};

/// A mock pad. Presses are injected by calling [`Pad::press`] and [`Pad::release`].
#[derive(Clone)]
pub struct Pad {
    name: String,
    buttons: Arc<HashMap<ButtonId, Arc<MockButton>>>,
    subscribers: Arc<Subscribers>,
    fail_open: Arc<Mutex<Option<String>>>,
    open: Arc<AtomicBool>,
    resets: Arc<AtomicUsize>,
}

struct MockButton {
    cell: ButtonCell,
}

impl Button for MockButton {
    fn id(&self) -> ButtonId {
        self.cell.id()
    }

    fn state(&self) -> PressState {
        self.cell.state()
    }

    fn brightness(&self) -> (Brightness, Brightness) {
        self.cell.brightness()
    }

    fn set_brightness(&self, red: Brightness, green: Brightness) -> Result<(), PadError> {
        self.cell.set_brightness(red, green);
        Ok(())
    }
}

impl Pad {
    /// Gets the given mock pad.
    pub fn get(name: &str) -> Pad {
        let buttons = ButtonId::all()
            .into_iter()
            .map(|id| {
                (
                    id,
                    Arc::new(MockButton {
                        cell: ButtonCell::new(id),
                    }),
                )
            })
            .collect();

        Pad {
            name: name.to_string(),
            buttons: Arc::new(buttons),
            subscribers: Arc::new(Subscribers::default()),
            fail_open: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes subsequent calls to open fail with the given message, or succeed again with None.
    pub fn set_fail_open(&self, message: Option<String>) {
        *self.fail_open.lock() = message;
    }

    /// Presses a button and emits the event.
    pub fn press(&self, id: ButtonId) {
        self.emit(RawButtonEvent::new(id, PressState::Down));
    }

    /// Releases a button and emits the event.
    pub fn release(&self, id: ButtonId) {
        self.emit(RawButtonEvent::new(id, PressState::Up));
    }

    /// Changes the live state of a button without emitting anything, as if the event was lost.
    pub fn set_live_state(&self, id: ButtonId, state: PressState) {
        if let Some(button) = self.buttons.get(&id) {
            button.cell.set_state(state);
        }
    }

    fn emit(&self, event: RawButtonEvent) {
        self.set_live_state(event.button(), event.transition());
        self.subscribers.notify(event);
    }

    /// Returns true if the pad is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Returns how many times the pad has been reset.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    /// Returns the number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl super::Pad for Pad {
    fn open(&self) -> Result<(), PadError> {
        let span = span!(Level::INFO, "open pad (mock)");
        let _enter = span.enter();

        if let Some(message) = self.fail_open.lock().as_ref() {
            return Err(PadError::Device(message.clone()));
        }
        self.open.store(true, Ordering::Relaxed);
        info!(device = self.name, "Pad opened.");
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    fn reset(&self) -> Result<(), PadError> {
        if !self.is_open() {
            return Err(PadError::NotOpen);
        }
        for button in self.buttons.values() {
            button.cell.set_brightness(Brightness::Off, Brightness::Off);
        }
        self.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id)
    }

    fn button(&self, id: ButtonId) -> Option<Arc<dyn Button>> {
        self.buttons
            .get(&id)
            .map(|button| button.clone() as Arc<dyn Button>)
    }

    fn buttons(&self) -> Vec<Arc<dyn Button>> {
        ButtonId::all()
            .into_iter()
            .filter_map(|id| self.button(id))
            .collect()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Pad>, PadError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use crate::pad::{Pad as _, SideButton};

    use super::*;

    #[test]
    fn test_press_updates_state_and_notifies() {
        let pad = Pad::get("mock");
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            pad.subscribe(Arc::new(move |event| events.lock().push(event)));
        }

        let id = ButtonId::Side(SideButton::Solo);
        pad.press(id);
        assert_eq!(pad.button(id).unwrap().state(), PressState::Down);
        pad.release(id);
        assert_eq!(pad.button(id).unwrap().state(), PressState::Up);

        assert_eq!(
            *events.lock(),
            vec![
                RawButtonEvent::new(id, PressState::Down),
                RawButtonEvent::new(id, PressState::Up)
            ]
        );
    }

    #[test]
    fn test_lost_event_changes_state_silently() {
        let pad = Pad::get("mock");
        let events = Arc::new(AtomicUsize::new(0));
        {
            let events = events.clone();
            pad.subscribe(Arc::new(move |_| {
                events.fetch_add(1, Ordering::Relaxed);
            }));
        }

        let id = ButtonId::Grid { x: 2, y: 5 };
        pad.press(id);
        pad.set_live_state(id, PressState::Up);
        assert_eq!(pad.button(id).unwrap().state(), PressState::Up);
        assert_eq!(events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_open_failure_and_reset() {
        let pad = Pad::get("mock");
        pad.set_fail_open(Some("unplugged".to_string()));
        assert!(pad.open().is_err());
        assert!(!pad.is_open());
        assert!(pad.reset().is_err());

        pad.set_fail_open(None);
        pad.open().unwrap();
        let button = pad.button(ButtonId::Grid { x: 0, y: 0 }).unwrap();
        button
            .set_brightness(Brightness::Full, Brightness::Low)
            .unwrap();
        pad.reset().unwrap();
        assert_eq!(button.brightness(), (Brightness::Off, Brightness::Off));
        assert_eq!(pad.reset_count(), 1);
    }
}
