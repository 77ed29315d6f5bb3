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
//! The sound catalog: sounds, the cues bound to them, and its JSON file.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::error::CatalogError;

/// The file a catalog is saved to when it wasn't loaded from anywhere.
pub const DEFAULT_CATALOG_FILE: &str = "soundconfig.json";

/// The extensions picked up when scanning a media directory.
const AUDIO_EXTENSIONS: [&str; 3] = ["wav", "mp3", "flac"];

/// Cues generated for a new sound: one per grid column.
const GENERATED_CUES: u8 = 8;

fn default_pitch() -> f32 {
    1.0
}

/// A named way of playing a sound.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Cue {
    cue_name: String,
    #[serde(default)]
    start_ms: u64,
    #[serde(default)]
    fade_in_ms: u64,
    #[serde(default)]
    fade_out_ms: u64,
    #[serde(default)]
    start_silent: bool,
    #[serde(default = "default_pitch")]
    pitch: f32,
}

impl Cue {
    /// Creates a cue that plays the whole sound unmodified.
    pub fn new(cue_name: &str) -> Cue {
        Cue {
            cue_name: cue_name.to_string(),
            start_ms: 0,
            fade_in_ms: 0,
            fade_out_ms: 0,
            start_silent: false,
            pitch: default_pitch(),
        }
    }

    pub fn with_start(mut self, start: Duration) -> Cue {
        self.start_ms = start.as_millis() as u64;
        self
    }

    pub fn with_fades(mut self, fade_in: Duration, fade_out: Duration, start_silent: bool) -> Cue {
        self.fade_in_ms = fade_in.as_millis() as u64;
        self.fade_out_ms = fade_out.as_millis() as u64;
        self.start_silent = start_silent;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Cue {
        self.pitch = pitch;
        self
    }

    pub fn name(&self) -> &str {
        &self.cue_name
    }

    /// Where in the sound playback starts.
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn start_silent(&self) -> bool {
        self.start_silent
    }

    /// The pitch factor, where 1.0 is unmodified.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }
}

/// The pitch generated for grid column `x`. The first column plays unmodified at 1.0. The
/// rest follow `2x / 7`, so column 1 drops to 2/7 and the line only reaches 2.0 at column 7.
/// Columns 1 to 3 are pitched below the unmodified first column.
pub fn grid_pitch(x: u8) -> f32 {
    if x == 0 {
        1.0
    } else {
        (x as f32 / 7.0) * 2.0
    }
}

/// An audio file and its cues.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Sound {
    id: String,
    file_path: String,
    #[serde(rename = "loop", default)]
    looping: bool,
    #[serde(default)]
    cues: Vec<Cue>,
}

impl Sound {
    pub fn new(id: &str, file_path: &str, looping: bool, cues: Vec<Cue>) -> Sound {
        Sound {
            id: id.to_string(),
            file_path: file_path.to_string(),
            looping,
            cues,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The file path as written in the catalog.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Whether the sound restarts its cue when it plays to the end.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// Returns every cue with the given name.
    pub fn cues_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Cue> + 'a {
        self.cues.iter().filter(move |cue| cue.cue_name == name)
    }

    pub fn has_cue(&self, name: &str) -> bool {
        self.cues_named(name).next().is_some()
    }
}

/// An ordered collection of sounds, loaded and saved as a whole.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SoundCatalog {
    #[serde(default)]
    sounds: Vec<Sound>,
    #[serde(skip)]
    source_file: Option<PathBuf>,
}

impl PartialEq for SoundCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.sounds == other.sounds
    }
}

impl SoundCatalog {
    pub fn new(sounds: Vec<Sound>) -> SoundCatalog {
        SoundCatalog {
            sounds,
            source_file: None,
        }
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    /// Looks up a sound by ID, ignoring case.
    pub fn sound(&self, id: &str) -> Option<&Sound> {
        self.sounds
            .iter()
            .find(|sound| sound.id.eq_ignore_ascii_case(id))
    }

    /// The file this catalog was loaded from or last saved to.
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Loads a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<SoundCatalog, CatalogError> {
        let mut catalog: SoundCatalog = serde_json::from_str(&fs::read_to_string(path)?)?;
        catalog.source_file = Some(path.to_path_buf());
        info!(path = ?path, sounds = catalog.sounds.len(), "Catalog loaded.");
        Ok(catalog)
    }

    /// Saves the catalog to the file it came from, or to the default catalog file.
    pub fn save(&mut self) -> Result<(), CatalogError> {
        let path = self
            .source_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_FILE));
        self.save_as(&path)
    }

    /// Saves the catalog to the given file, which becomes its source file.
    pub fn save_as(&mut self, path: &Path) -> Result<(), CatalogError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        self.source_file = Some(path.to_path_buf());
        info!(path = ?path, sounds = self.sounds.len(), "Catalog saved.");
        Ok(())
    }

    /// Resolves a sound's file path. Relative paths are relative to the catalog's directory.
    pub fn resolve_path(&self, sound: &Sound) -> PathBuf {
        let path = PathBuf::from(sound.file_path.replace('\\', "/"));
        if path.is_absolute() {
            return path;
        }
        match self.source_file.as_deref().and_then(Path::parent) {
            Some(base) => base.join(path),
            None => path,
        }
    }

    /// Loads the catalog for a media directory, adding generated cues for any audio file in
    /// the directory that no sound refers to yet. The result is always saved back.
    ///
    /// A catalog file that can't be parsed is replaced with an empty catalog.
    pub fn load_or_build(media_dir: &Path) -> Result<SoundCatalog, CatalogError> {
        if !media_dir.is_dir() {
            error!(path = ?media_dir, "Media directory does not exist.");
            return Err(CatalogError::MissingDirectory(media_dir.to_path_buf()));
        }

        let path = catalog_path_for(media_dir);
        let mut catalog = if path.exists() {
            match SoundCatalog::load(&path) {
                Ok(catalog) => catalog,
                Err(e) => {
                    error!(path = ?path, err = %e, "Unable to load catalog, starting empty.");
                    SoundCatalog::default()
                }
            }
        } else {
            SoundCatalog::default()
        };
        catalog.source_file = Some(path.clone());

        let known: HashSet<String> = catalog
            .sounds
            .iter()
            .map(|sound| normalize(&sound.file_path))
            .collect();
        let mut row = 0;
        for file_name in scan(media_dir)? {
            if known.contains(&normalize(&file_name)) {
                continue;
            }
            let cues = (0..GENERATED_CUES)
                .map(|x| {
                    Cue::new(&format!("Grid({},{})", x, row)).with_pitch(grid_pitch(x))
                })
                .collect();
            info!(sound = %file_name, row, "Adding sound.");
            catalog
                .sounds
                .push(Sound::new(&file_name, &file_name, false, cues));
            row += 1;
        }

        if let Err(e) = catalog.save_as(&path) {
            warn!(path = ?path, err = %e, "Unable to save catalog.");
        }
        Ok(catalog)
    }
}

/// The catalog file for a media directory: `<dir>/<dir name>.json`.
pub fn catalog_path_for(media_dir: &Path) -> PathBuf {
    let name = media_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .or_else(|| {
            media_dir
                .canonicalize()
                .ok()
                .and_then(|dir| dir.file_name().map(|name| name.to_string_lossy().to_string()))
        })
        .unwrap_or_else(|| "soundconfig".to_string());
    media_dir.join(format!("{}.json", name))
}

/// Lists the audio files directly inside a directory, sorted by name.
fn scan(media_dir: &Path) -> Result<Vec<String>, CatalogError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(media_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_audio = path.extension().is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.to_string_lossy().eq_ignore_ascii_case(known))
        });
        if let (true, Some(name)) = (is_audio, path.file_name()) {
            files.push(name.to_string_lossy().to_string());
        }
    }
    files.sort();
    Ok(files)
}

/// Normalizes a catalog path for comparison.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./")
        .unwrap_or(&path)
        .to_lowercase()
}
