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
use std::{collections::HashMap, fmt, sync::Arc};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use midly::{live::LiveEvent, MidiMessage};
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use crate::color::Brightness;

use super::{
    Button, ButtonCell, ButtonId, Listener, PadError, PressState, RawButtonEvent, SideButton,
    SubscriptionId, Subscribers, ToolbarButton,
};

/// The toolbar buttons send control changes starting at this controller number.
const TOOLBAR_FIRST_CC: u8 = 104;

/// LED velocity flags that write to both display buffers.
const LED_FLAGS: u8 = 12;

const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

type SharedOutput = Arc<Mutex<Option<MidiOutputConnection>>>;

/// A Novation Launchpad (first generation, S and Mini layouts) connected through midir.
pub struct Launchpad {
    name: String,
    buttons: Arc<HashMap<ButtonId, Arc<LaunchpadButton>>>,
    output: SharedOutput,
    input: Mutex<Option<MidiInputConnection<()>>>,
    subscribers: Arc<Subscribers>,
}

struct LaunchpadButton {
    cell: ButtonCell,
    output: SharedOutput,
}

impl Button for LaunchpadButton {
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
        send(&self.output, &led_message(self.cell.id(), red, green))?;
        self.cell.set_brightness(red, green);
        Ok(())
    }
}

fn send(output: &SharedOutput, message: &[u8]) -> Result<(), PadError> {
    match output.lock().as_mut() {
        Some(connection) => Ok(connection.send(message)?),
        None => Err(PadError::NotOpen),
    }
}

/// Lists the names of all MIDI input ports.
pub(super) fn list() -> Result<Vec<String>, PadError> {
    let input = MidiInput::new("cuepad port listing")?;
    Ok(input
        .ports()
        .iter()
        .filter_map(|port| input.port_name(port).ok())
        .collect())
}

impl Launchpad {
    /// Creates a pad that will connect to the first MIDI ports whose names contain `name`.
    pub fn get(name: &str) -> Launchpad {
        let output: SharedOutput = Arc::new(Mutex::new(None));
        let buttons = ButtonId::all()
            .into_iter()
            .map(|id| {
                (
                    id,
                    Arc::new(LaunchpadButton {
                        cell: ButtonCell::new(id),
                        output: output.clone(),
                    }),
                )
            })
            .collect();

        Launchpad {
            name: name.to_string(),
            buttons: Arc::new(buttons),
            output,
            input: Mutex::new(None),
            subscribers: Arc::new(Subscribers::default()),
        }
    }
}

impl super::Pad for Launchpad {
    fn open(&self) -> Result<(), PadError> {
        let span = span!(Level::INFO, "open pad (midir)");
        let _enter = span.enter();

        let mut input_connection = self.input.lock();
        if input_connection.is_some() {
            return Ok(());
        }

        let input = MidiInput::new("cuepad input")?;
        let input_port = input
            .ports()
            .into_iter()
            .find(|port| {
                input
                    .port_name(port)
                    .is_ok_and(|port_name| port_name.contains(&self.name))
            })
            .ok_or_else(|| PadError::PortNotFound(self.name.clone()))?;

        let output = MidiOutput::new("cuepad output")?;
        let output_port = output
            .ports()
            .into_iter()
            .find(|port| {
                output
                    .port_name(port)
                    .is_ok_and(|port_name| port_name.contains(&self.name))
            })
            .ok_or_else(|| PadError::PortNotFound(self.name.clone()))?;

        let output_connection = output
            .connect(&output_port, "cuepad pad lights")
            .map_err(|e| PadError::Connect(e.to_string()))?;
        *self.output.lock() = Some(output_connection);

        let buttons = self.buttons.clone();
        let subscribers = self.subscribers.clone();
        let connection = input.connect(
            &input_port,
            "cuepad pad watcher",
            move |_, raw_event, _| match decode(raw_event) {
                Some(event) => {
                    if let Some(button) = buttons.get(&event.button()) {
                        button.cell.set_state(event.transition());
                    }
                    subscribers.notify(event);
                }
                None => debug!(raw = ?raw_event, "Ignoring unrecognized MIDI message."),
            },
            (),
        );
        match connection {
            Ok(connection) => *input_connection = Some(connection),
            Err(e) => {
                self.output.lock().take();
                return Err(PadError::Connect(e.to_string()));
            }
        }

        info!(device = self.name, "Pad opened.");
        Ok(())
    }

    fn close(&self) {
        // Dropping the connections closes the ports.
        self.input.lock().take();
        self.output.lock().take();
        info!(device = self.name, "Pad closed.");
    }

    fn reset(&self) -> Result<(), PadError> {
        send(&self.output, &[CONTROL_CHANGE, 0, 0])?;
        for button in self.buttons.values() {
            button.cell.set_brightness(Brightness::Off, Brightness::Off);
        }
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
    fn to_mock(&self) -> Result<Arc<super::mock::Pad>, PadError> {
        Err(PadError::Device(format!("{} is not a mock pad", self.name)))
    }
}

impl fmt::Display for Launchpad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Launchpad)", self.name)
    }
}

/// Maps a note number to the grid or side button that sends it.
fn note_button(key: u8) -> Option<ButtonId> {
    let (x, y) = (key % 16, key / 16);
    if y >= ButtonId::GRID_SIZE {
        return None;
    }
    match x {
        0..=7 => Some(ButtonId::Grid { x, y }),
        8 => SideButton::from_index(y).map(ButtonId::Side),
        _ => None,
    }
}

/// Maps a controller number to the toolbar button that sends it.
fn toolbar_button(controller: u8) -> Option<ButtonId> {
    controller
        .checked_sub(TOOLBAR_FIRST_CC)
        .and_then(ToolbarButton::from_index)
        .map(ButtonId::Toolbar)
}

fn transition(velocity: u8) -> PressState {
    if velocity > 0 {
        PressState::Down
    } else {
        PressState::Up
    }
}

/// Decodes a raw MIDI message from the pad into a button event.
fn decode(raw_event: &[u8]) -> Option<RawButtonEvent> {
    let LiveEvent::Midi { message, .. } = LiveEvent::parse(raw_event).ok()? else {
        return None;
    };

    match message {
        MidiMessage::NoteOn { key, vel } => note_button(u8::from(key))
            .map(|id| RawButtonEvent::new(id, transition(u8::from(vel)))),
        MidiMessage::NoteOff { key, .. } => {
            note_button(u8::from(key)).map(|id| RawButtonEvent::new(id, PressState::Up))
        }
        MidiMessage::Controller { controller, value } => toolbar_button(u8::from(controller))
            .map(|id| RawButtonEvent::new(id, transition(u8::from(value)))),
        _ => None,
    }
}

/// Encodes the message that lights a button.
fn led_message(id: ButtonId, red: Brightness, green: Brightness) -> [u8; 3] {
    let velocity = 16 * green.level() + red.level() + LED_FLAGS;
    match id {
        ButtonId::Grid { x, y } => [NOTE_ON, 16 * y + x, velocity],
        ButtonId::Side(button) => [NOTE_ON, 16 * button.index() + 8, velocity],
        ButtonId::Toolbar(button) => [CONTROL_CHANGE, TOOLBAR_FIRST_CC + button.index(), velocity],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pad::Pad;

    #[test]
    fn test_decode_grid() {
        assert_eq!(
            decode(&[0x90, 0x23, 127]),
            Some(RawButtonEvent::new(
                ButtonId::Grid { x: 3, y: 2 },
                PressState::Down
            ))
        );
        assert_eq!(
            decode(&[0x90, 0x23, 0]),
            Some(RawButtonEvent::new(
                ButtonId::Grid { x: 3, y: 2 },
                PressState::Up
            ))
        );
        assert_eq!(
            decode(&[0x80, 0x00, 64]),
            Some(RawButtonEvent::new(
                ButtonId::Grid { x: 0, y: 0 },
                PressState::Up
            ))
        );
    }

    #[test]
    fn test_decode_side_and_toolbar() {
        assert_eq!(
            decode(&[0x90, 0x78, 127]),
            Some(RawButtonEvent::new(
                ButtonId::Side(SideButton::Arm),
                PressState::Down
            ))
        );
        assert_eq!(
            decode(&[0xB0, 111, 127]),
            Some(RawButtonEvent::new(
                ButtonId::Toolbar(ToolbarButton::Mixer),
                PressState::Down
            ))
        );
        assert_eq!(
            decode(&[0xB0, 104, 0]),
            Some(RawButtonEvent::new(
                ButtonId::Toolbar(ToolbarButton::Up),
                PressState::Up
            ))
        );
    }

    #[test]
    fn test_decode_ignores_unknown_messages() {
        assert_eq!(decode(&[0x90, 0x09, 127]), None);
        assert_eq!(decode(&[0xB0, 0, 0]), None);
        assert_eq!(decode(&[0xC0, 5]), None);
        assert_eq!(decode(&[1, 2, 3]), None);
    }

    #[test]
    fn test_led_message() {
        assert_eq!(
            led_message(ButtonId::Grid { x: 1, y: 1 }, Brightness::Off, Brightness::Full),
            [0x90, 17, 60]
        );
        assert_eq!(
            led_message(
                ButtonId::Side(SideButton::Volume),
                Brightness::Full,
                Brightness::Off
            ),
            [0x90, 8, 15]
        );
        assert_eq!(
            led_message(
                ButtonId::Toolbar(ToolbarButton::Session),
                Brightness::Low,
                Brightness::Low
            ),
            [0xB0, 108, 29]
        );
    }

    #[test]
    fn test_unopened_pad() {
        let pad = Launchpad::get("Launchpad");
        assert!(matches!(pad.reset(), Err(PadError::NotOpen)));

        let button = pad.button(ButtonId::Grid { x: 0, y: 0 }).unwrap();
        assert!(button
            .set_brightness(Brightness::Full, Brightness::Full)
            .is_err());
        assert_eq!(button.brightness(), (Brightness::Off, Brightness::Off));
        assert_eq!(pad.buttons().len(), 80);
    }
}
