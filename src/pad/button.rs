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

//! Button identities, press states, and the shared live state of a button.

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};

use crate::color::Brightness;

use super::PadError;

/// The buttons in the column to the right of the grid, top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SideButton {
    Volume,
    Pan,
    SoundA,
    SoundB,
    Stop,
    TrackOn,
    Solo,
    Arm,
}

impl SideButton {
    pub const ALL: [SideButton; 8] = [
        SideButton::Volume,
        SideButton::Pan,
        SideButton::SoundA,
        SideButton::SoundB,
        SideButton::Stop,
        SideButton::TrackOn,
        SideButton::Solo,
        SideButton::Arm,
    ];

    /// The row of this button, counting from the top.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// The side button in the given row.
    pub fn from_index(index: u8) -> Option<SideButton> {
        SideButton::ALL.get(usize::from(index)).copied()
    }
}

/// The buttons in the row above the grid, left to right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolbarButton {
    Up,
    Down,
    Left,
    Right,
    Session,
    User1,
    User2,
    Mixer,
}

impl ToolbarButton {
    pub const ALL: [ToolbarButton; 8] = [
        ToolbarButton::Up,
        ToolbarButton::Down,
        ToolbarButton::Left,
        ToolbarButton::Right,
        ToolbarButton::Session,
        ToolbarButton::User1,
        ToolbarButton::User2,
        ToolbarButton::Mixer,
    ];

    /// The column of this button, counting from the left.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// The toolbar button in the given column.
    pub fn from_index(index: u8) -> Option<ToolbarButton> {
        ToolbarButton::ALL.get(usize::from(index)).copied()
    }
}

impl fmt::Display for SideButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ToolbarButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for SideButton {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SideButton::ALL
            .into_iter()
            .find(|button| button.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PadError::UnrecognizedIdentity(s.to_string()))
    }
}

impl FromStr for ToolbarButton {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolbarButton::ALL
            .into_iter()
            .find(|button| button.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PadError::UnrecognizedIdentity(s.to_string()))
    }
}

/// Which group of buttons a button belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Grid,
    Side,
    Toolbar,
}

/// The identity of a physical button.
///
/// The display form ("Grid(x,y)", "Side(Name)", "Toolbar(Name)") is the key that cues
/// are bound to, so it must never change for a given button.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Grid { x: u8, y: u8 },
    Side(SideButton),
    Toolbar(ToolbarButton),
}

impl ButtonId {
    /// Number of columns and rows in the grid.
    pub const GRID_SIZE: u8 = 8;

    /// Returns the group this button belongs to.
    pub fn kind(&self) -> ChannelKind {
        match self {
            ButtonId::Grid { .. } => ChannelKind::Grid,
            ButtonId::Side(_) => ChannelKind::Side,
            ButtonId::Toolbar(_) => ChannelKind::Toolbar,
        }
    }

    /// True if this identity refers to a button that physically exists.
    pub fn is_physical(&self) -> bool {
        match self {
            ButtonId::Grid { x, y } => *x < Self::GRID_SIZE && *y < Self::GRID_SIZE,
            _ => true,
        }
    }

    /// Every physical button: the grid row by row, then the side column, then the toolbar.
    pub fn all() -> Vec<ButtonId> {
        let mut ids = Vec::with_capacity(80);
        for y in 0..Self::GRID_SIZE {
            for x in 0..Self::GRID_SIZE {
                ids.push(ButtonId::Grid { x, y });
            }
        }
        ids.extend(SideButton::ALL.into_iter().map(ButtonId::Side));
        ids.extend(ToolbarButton::ALL.into_iter().map(ButtonId::Toolbar));
        ids
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonId::Grid { x, y } => write!(f, "Grid({},{})", x, y),
            ButtonId::Side(button) => write!(f, "Side({})", button),
            ButtonId::Toolbar(button) => write!(f, "Toolbar({})", button),
        }
    }
}

impl FromStr for ButtonId {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unrecognized = || PadError::UnrecognizedIdentity(s.to_string());
        let inner = |prefix: &str| {
            s.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('('))
                .and_then(|rest| rest.strip_suffix(')'))
        };

        if let Some(name) = inner("Toolbar") {
            return Ok(ButtonId::Toolbar(name.parse().map_err(|_| unrecognized())?));
        }
        if let Some(name) = inner("Side") {
            return Ok(ButtonId::Side(name.parse().map_err(|_| unrecognized())?));
        }
        if let Some(coordinates) = inner("Grid") {
            let (x, y) = coordinates.split_once(',').ok_or_else(unrecognized)?;
            let x = x.trim().parse::<u8>().map_err(|_| unrecognized())?;
            let y = y.trim().parse::<u8>().map_err(|_| unrecognized())?;
            return Ok(ButtonId::Grid { x, y });
        }

        Err(unrecognized())
    }
}

/// Whether a button is held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PressState {
    #[default]
    Up,
    Down,
}

/// A press or release reported by the device. Synthesized releases use the same type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawButtonEvent {
    button: ButtonId,
    transition: PressState,
}

impl RawButtonEvent {
    pub fn new(button: ButtonId, transition: PressState) -> RawButtonEvent {
        RawButtonEvent { button, transition }
    }

    pub fn button(&self) -> ButtonId {
        self.button
    }

    pub fn transition(&self) -> PressState {
        self.transition
    }

    pub fn kind(&self) -> ChannelKind {
        self.button.kind()
    }
}

/// Live state of one button, shared between the device's input thread and its handles.
#[derive(Debug)]
pub(crate) struct ButtonCell {
    id: ButtonId,
    pressed: AtomicBool,
    red: AtomicU8,
    green: AtomicU8,
}

impl ButtonCell {
    pub(crate) fn new(id: ButtonId) -> ButtonCell {
        ButtonCell {
            id,
            pressed: AtomicBool::new(false),
            red: AtomicU8::new(0),
            green: AtomicU8::new(0),
        }
    }

    pub(crate) fn id(&self) -> ButtonId {
        self.id
    }

    pub(crate) fn state(&self) -> PressState {
        if self.pressed.load(Ordering::Acquire) {
            PressState::Down
        } else {
            PressState::Up
        }
    }

    pub(crate) fn set_state(&self, state: PressState) {
        self.pressed
            .store(state == PressState::Down, Ordering::Release);
    }

    pub(crate) fn brightness(&self) -> (Brightness, Brightness) {
        (
            Brightness::from_level(self.red.load(Ordering::Relaxed)),
            Brightness::from_level(self.green.load(Ordering::Relaxed)),
        )
    }

    pub(crate) fn set_brightness(&self, red: Brightness, green: Brightness) {
        self.red.store(red.level(), Ordering::Relaxed);
        self.green.store(green.level(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_strings() {
        assert_eq!(ButtonId::Grid { x: 2, y: 3 }.to_string(), "Grid(2,3)");
        assert_eq!(
            ButtonId::Toolbar(ToolbarButton::Mixer).to_string(),
            "Toolbar(Mixer)"
        );
        assert_eq!(ButtonId::Side(SideButton::TrackOn).to_string(), "Side(TrackOn)");
    }

    #[test]
    fn test_identity_round_trip() {
        for id in ButtonId::all() {
            assert_eq!(id.to_string().parse::<ButtonId>().unwrap(), id);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_for_names() {
        assert_eq!(
            "Toolbar(mixer)".parse::<ButtonId>().unwrap(),
            ButtonId::Toolbar(ToolbarButton::Mixer)
        );
        assert_eq!(
            "Side(SOUNDA)".parse::<ButtonId>().unwrap(),
            ButtonId::Side(SideButton::SoundA)
        );
    }

    #[test]
    fn test_unrecognized_identities() {
        for bad in [
            "",
            "Grid",
            "Grid(1)",
            "Grid(a,b)",
            "Grid(1,2",
            "Toolbar(Nope)",
            "Side()",
            "Button(1,1)",
        ] {
            assert!(bad.parse::<ButtonId>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_grid_outside_pad_is_not_physical() {
        let id: ButtonId = "Grid(8,0)".parse().unwrap();
        assert!(!id.is_physical());
        assert!(ButtonId::Grid { x: 7, y: 7 }.is_physical());
    }

    #[test]
    fn test_all_buttons() {
        let all = ButtonId::all();
        assert_eq!(all.len(), 80);
        assert_eq!(all.iter().filter(|id| id.kind() == ChannelKind::Grid).count(), 64);
        assert_eq!(all.iter().filter(|id| id.kind() == ChannelKind::Side).count(), 8);
        assert_eq!(all.iter().filter(|id| id.kind() == ChannelKind::Toolbar).count(), 8);
    }

    #[test]
    fn test_button_cell() {
        let cell = ButtonCell::new(ButtonId::Grid { x: 0, y: 0 });
        assert_eq!(cell.state(), PressState::Up);
        cell.set_state(PressState::Down);
        assert_eq!(cell.state(), PressState::Down);
        cell.set_brightness(Brightness::Low, Brightness::Full);
        assert_eq!(cell.brightness(), (Brightness::Low, Brightness::Full));
    }
}
