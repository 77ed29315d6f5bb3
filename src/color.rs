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

//! Mapping between button colors and the red/green LED brightness pair.

use std::fmt;

/// The brightness of one LED channel on a button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Brightness {
    #[default]
    Off,
    Low,
    Medium,
    Full,
}

impl Brightness {
    /// All brightness levels, dimmest first.
    pub const ALL: [Brightness; 4] = [
        Brightness::Off,
        Brightness::Low,
        Brightness::Medium,
        Brightness::Full,
    ];

    /// The two-bit level used on the wire (0 = off, 3 = full).
    pub fn level(self) -> u8 {
        match self {
            Brightness::Off => 0,
            Brightness::Low => 1,
            Brightness::Medium => 2,
            Brightness::Full => 3,
        }
    }

    /// The brightness for a two-bit level. Anything above 3 is full.
    pub fn from_level(level: u8) -> Brightness {
        match level {
            0 => Brightness::Off,
            1 => Brightness::Low,
            2 => Brightness::Medium,
            _ => Brightness::Full,
        }
    }
}

/// A named button color. Mixes are named red level first, then green level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ButtonColor {
    #[default]
    Off,
    Green,
    GreenMid,
    GreenLow,
    MixLowLow,
    MixMediumLow,
    MixHighLow,
    MixHighMedium,
    MixHighHigh,
    MixMediumHigh,
    MixMediumMedium,
    MixLowMedium,
    MixLowHigh,
    Red,
    RedMid,
    RedLow,
}

impl ButtonColor {
    /// Every color tag.
    pub const ALL: [ButtonColor; 16] = [
        ButtonColor::Off,
        ButtonColor::Green,
        ButtonColor::GreenMid,
        ButtonColor::GreenLow,
        ButtonColor::MixLowLow,
        ButtonColor::MixMediumLow,
        ButtonColor::MixHighLow,
        ButtonColor::MixHighMedium,
        ButtonColor::MixHighHigh,
        ButtonColor::MixMediumHigh,
        ButtonColor::MixMediumMedium,
        ButtonColor::MixLowMedium,
        ButtonColor::MixLowHigh,
        ButtonColor::Red,
        ButtonColor::RedMid,
        ButtonColor::RedLow,
    ];

    /// Returns the (red, green) brightness pair for this color.
    pub fn levels(self) -> (Brightness, Brightness) {
        use Brightness::*;

        match self {
            ButtonColor::Off => (Off, Off),
            ButtonColor::Green => (Off, Full),
            ButtonColor::GreenMid => (Off, Medium),
            ButtonColor::GreenLow => (Off, Low),
            ButtonColor::Red => (Full, Off),
            ButtonColor::RedMid => (Medium, Off),
            ButtonColor::RedLow => (Low, Off),
            ButtonColor::MixHighHigh => (Full, Full),
            ButtonColor::MixHighMedium => (Full, Medium),
            ButtonColor::MixHighLow => (Full, Low),
            ButtonColor::MixMediumHigh => (Medium, Full),
            ButtonColor::MixMediumMedium => (Medium, Medium),
            ButtonColor::MixMediumLow => (Medium, Low),
            ButtonColor::MixLowHigh => (Low, Full),
            ButtonColor::MixLowMedium => (Low, Medium),
            ButtonColor::MixLowLow => (Low, Low),
        }
    }

    /// Returns the color for a (red, green) brightness pair.
    pub fn from_levels(red: Brightness, green: Brightness) -> ButtonColor {
        use Brightness::*;

        match (red, green) {
            (Off, Off) => ButtonColor::Off,
            (Off, Low) => ButtonColor::GreenLow,
            (Off, Medium) => ButtonColor::GreenMid,
            (Off, Full) => ButtonColor::Green,
            (Low, Off) => ButtonColor::RedLow,
            (Low, Low) => ButtonColor::MixLowLow,
            (Low, Medium) => ButtonColor::MixLowMedium,
            (Low, Full) => ButtonColor::MixLowHigh,
            (Medium, Off) => ButtonColor::RedMid,
            (Medium, Low) => ButtonColor::MixMediumLow,
            (Medium, Medium) => ButtonColor::MixMediumMedium,
            (Medium, Full) => ButtonColor::MixMediumHigh,
            (Full, Off) => ButtonColor::Red,
            (Full, Low) => ButtonColor::MixHighLow,
            (Full, Medium) => ButtonColor::MixHighMedium,
            (Full, Full) => ButtonColor::MixHighHigh,
        }
    }
}

impl fmt::Display for ButtonColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Returns the color tag for the given brightness pair.
pub fn color_for(red: Brightness, green: Brightness) -> ButtonColor {
    ButtonColor::from_levels(red, green)
}

/// Returns the brightness pair for the given color tag.
pub fn levels_for(color: ButtonColor) -> (Brightness, Brightness) {
    color.levels()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_round_trip_all_colors() {
        for color in ButtonColor::ALL {
            let (red, green) = levels_for(color);
            assert_eq!(color_for(red, green), color, "round trip failed for {}", color);
        }
    }

    #[test]
    fn test_levels_are_unique() {
        let levels: HashSet<(Brightness, Brightness)> =
            ButtonColor::ALL.iter().map(|c| c.levels()).collect();
        assert_eq!(levels.len(), 16);
    }

    #[test]
    fn test_every_level_pair_has_a_color() {
        for red in Brightness::ALL {
            for green in Brightness::ALL {
                assert_eq!(color_for(red, green).levels(), (red, green));
            }
        }
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(
            levels_for(ButtonColor::Green),
            (Brightness::Off, Brightness::Full)
        );
        assert_eq!(
            levels_for(ButtonColor::RedMid),
            (Brightness::Medium, Brightness::Off)
        );
        assert_eq!(
            color_for(Brightness::Full, Brightness::Low),
            ButtonColor::MixHighLow
        );
        assert_eq!(color_for(Brightness::Off, Brightness::Off), ButtonColor::Off);
    }

    #[test]
    fn test_brightness_wire_levels() {
        for brightness in Brightness::ALL {
            assert_eq!(Brightness::from_level(brightness.level()), brightness);
        }
        assert_eq!(Brightness::from_level(9), Brightness::Full);
    }
}
