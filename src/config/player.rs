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
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::{pad::ToolbarButton, tracker::DEFAULT_DEBOUNCE};

/// The default media directory, relative to the player config.
pub const DEFAULT_MEDIA_DIR: &str = "clips";

/// The modifier used when none is configured.
pub const DEFAULT_STOP_MODIFIER: ToolbarButton = ToolbarButton::Mixer;

fn default_media() -> String {
    DEFAULT_MEDIA_DIR.to_string()
}

/// The configuration for the launcher.
#[derive(Deserialize)]
pub struct Player {
    /// The MIDI port name of the pad.
    pad: String,
    /// The audio device to use.
    audio_device: String,
    /// The media directory.
    #[serde(default = "default_media")]
    media: String,
    /// How often held buttons are checked against the pad.
    debounce: Option<String>,
    /// The toolbar button that turns releases into stops.
    stop_modifier: Option<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Player {
    /// Creates a new player configuration.
    pub fn new(pad: &str, audio_device: &str, media: &str) -> Player {
        Player {
            pad: pad.to_string(),
            audio_device: audio_device.to_string(),
            media: media.to_string(),
            debounce: None,
            stop_modifier: None,
            base_dir: PathBuf::new(),
        }
    }

    /// Parse a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let mut player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;
        player.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(player)
    }

    pub fn pad(&self) -> &str {
        &self.pad
    }

    pub fn audio_device(&self) -> &str {
        &self.audio_device
    }

    /// The media directory. Relative paths are resolved against the config file's directory.
    pub fn media(&self) -> PathBuf {
        let media = Path::new(&self.media);
        if media.is_absolute() {
            media.to_path_buf()
        } else {
            self.base_dir.join(media)
        }
    }

    /// The reconciliation interval, at least one millisecond.
    pub fn debounce(&self) -> Result<Duration, ConfigError> {
        let debounce = match &self.debounce {
            Some(debounce) => DurationString::from_string(debounce.clone())
                .map_err(|e| ConfigError::Invalid {
                    field: "debounce",
                    message: e.to_string(),
                })?
                .into(),
            None => DEFAULT_DEBOUNCE,
        };
        Ok(debounce.max(Duration::from_millis(1)))
    }

    pub fn stop_modifier(&self) -> Result<ToolbarButton, ConfigError> {
        match &self.stop_modifier {
            Some(name) => name.parse().map_err(|_| ConfigError::Invalid {
                field: "stop_modifier",
                message: format!("unknown toolbar button '{}'", name),
            }),
            None => Ok(DEFAULT_STOP_MODIFIER),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("cuepad.yaml");
        fs::write(&path, contents).unwrap();
        (tempdir, path)
    }

    #[test]
    fn test_full_config() {
        let (tempdir, path) = write_config(
            r#"
            pad: Launchpad Mini
            audio_device: mock-out
            media: /srv/clips
            debounce: 10ms
            stop_modifier: session
            "#,
        );

        let player = Player::deserialize(&path).unwrap();
        assert_eq!(player.pad(), "Launchpad Mini");
        assert_eq!(player.audio_device(), "mock-out");
        assert_eq!(player.media(), PathBuf::from("/srv/clips"));
        assert_eq!(player.debounce().unwrap(), Duration::from_millis(10));
        assert_eq!(player.stop_modifier().unwrap(), ToolbarButton::Session);
        drop(tempdir);
    }

    #[test]
    fn test_defaults() {
        let (tempdir, path) = write_config(
            r#"
            pad: mock-pad
            audio_device: mock-out
            "#,
        );

        let player = Player::deserialize(&path).unwrap();
        assert_eq!(player.media(), tempdir.path().join("clips"));
        assert_eq!(player.debounce().unwrap(), DEFAULT_DEBOUNCE);
        assert_eq!(player.stop_modifier().unwrap(), ToolbarButton::Mixer);
    }

    #[test]
    fn test_invalid_values() {
        let (_tempdir, path) = write_config(
            r#"
            pad: mock-pad
            audio_device: mock-out
            debounce: soon
            stop_modifier: Shift
            "#,
        );

        let player = Player::deserialize(&path).unwrap();
        assert!(matches!(
            player.debounce(),
            Err(ConfigError::Invalid {
                field: "debounce",
                ..
            })
        ));
        assert!(player.stop_modifier().is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let (_tempdir, path) = write_config("pad: mock-pad\n");
        assert!(matches!(
            Player::deserialize(&path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_debounce_is_clamped() {
        let mut player = Player::new("mock-pad", "mock-out", "clips");
        player.debounce = Some("0ms".to_string());
        assert_eq!(player.debounce().unwrap(), Duration::from_millis(1));
    }
}
