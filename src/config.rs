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
use std::{error::Error, path::Path, sync::Arc};

use tracing::info;

use crate::{audio, cues::CueDispatcher, launcher::Launcher, pad, tracker::ButtonTracker};

mod catalog;
mod error;
mod player;

pub use catalog::{catalog_path_for, grid_pitch, Cue, Sound, SoundCatalog, DEFAULT_CATALOG_FILE};
pub use error::{CatalogError, ConfigError};
pub use player::Player;

/// Initializes the launcher from the given player config file: opens the audio sink, loads
/// or builds the sound catalog, and wires the pad to the dispatcher. The pad isn't opened
/// until the launcher is started.
pub fn init_launcher(path: &Path) -> Result<Launcher, Box<dyn Error>> {
    let player = Player::deserialize(path)?;

    let sink = audio::get_sink(player.audio_device())?;
    info!(sink = %sink, "Audio sink ready.");
    let dispatcher = Arc::new(CueDispatcher::new(sink));
    dispatcher.load_or_build(&player.media())?;

    let tracker = ButtonTracker::new(pad::get_device(player.pad()));
    tracker.set_debounce(player.debounce()?);

    Ok(Launcher::new(tracker, dispatcher, player.stop_modifier()?))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_init_launcher_with_mocks() {
        let tempdir = tempfile::tempdir().unwrap();
        fs::create_dir(tempdir.path().join("clips")).unwrap();
        let path = tempdir.path().join("cuepad.yaml");
        fs::write(
            &path,
            "pad: mock-pad\naudio_device: mock-out\ndebounce: 3ms\n",
        )
        .unwrap();

        let launcher = init_launcher(&path).unwrap();
        assert_eq!(
            launcher.tracker().debounce(),
            std::time::Duration::from_millis(3)
        );
        assert!(launcher.dispatcher().catalog().sounds().is_empty());
        assert!(tempdir.path().join("clips").join("clips.json").exists());
    }

    #[test]
    fn test_init_launcher_missing_media() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("cuepad.yaml");
        fs::write(&path, "pad: mock-pad\naudio_device: mock-out\n").unwrap();

        assert!(init_launcher(&path).is_err());
    }
}
