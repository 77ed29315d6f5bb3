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
use std::{error::Error, path::Path, sync::Arc, thread, time::Duration};

use parking_lot::RwLock;
use tracing::{info, span, warn, Level};

use crate::{
    audio::{loader::ClipLoader, Playback, PlaybackState, Sink},
    config::{CatalogError, Cue, Sound, SoundCatalog},
};

pub mod session;

pub use session::SoundSession;

/// Maps cue names to sound playback. Every sound in the catalog gets a session; triggering
/// a cue starts every sound that carries it.
pub struct CueDispatcher {
    sink: Arc<dyn Sink>,
    loader: Arc<ClipLoader>,
    catalog: RwLock<SoundCatalog>,
    sessions: RwLock<Vec<Arc<SoundSession>>>,
}

impl CueDispatcher {
    /// Creates a dispatcher with an empty catalog.
    pub fn new(sink: Arc<dyn Sink>) -> CueDispatcher {
        let loader = Arc::new(ClipLoader::new(sink.sample_rate()));
        CueDispatcher {
            sink,
            loader,
            catalog: RwLock::new(SoundCatalog::default()),
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the catalog. Sessions for the old catalog are stopped and the audio cache is
    /// dropped.
    pub fn set_catalog(&self, catalog: SoundCatalog) {
        let span = span!(Level::INFO, "set catalog");
        let _enter = span.enter();

        let sessions: Vec<Arc<SoundSession>> = catalog
            .sounds()
            .iter()
            .map(|sound| {
                SoundSession::new(
                    sound.clone(),
                    catalog.resolve_path(sound),
                    self.sink.clone(),
                    self.loader.clone(),
                )
            })
            .collect();

        let old = std::mem::replace(&mut *self.sessions.write(), sessions);
        self.dispose(old);
        info!(sounds = catalog.sounds().len(), "Catalog loaded.");
        *self.catalog.write() = catalog;
    }

    fn dispose(&self, sessions: Vec<Arc<SoundSession>>) {
        if sessions.is_empty() {
            return;
        }
        for session in sessions.iter() {
            session.stop();
        }
        self.loader.clear();
        info!("Audio cache disposed.");
    }

    /// Loads a catalog from a JSON file.
    pub fn load(&self, path: &Path) -> Result<(), CatalogError> {
        self.set_catalog(SoundCatalog::load(path)?);
        Ok(())
    }

    /// Loads the catalog for a media directory, adding any new audio files to it.
    pub fn load_or_build(&self, media_dir: &Path) -> Result<(), CatalogError> {
        self.set_catalog(SoundCatalog::load_or_build(media_dir)?);
        Ok(())
    }

    /// Saves the catalog to the file it was loaded from.
    pub fn save(&self) -> Result<(), CatalogError> {
        self.catalog.write().save()
    }

    pub fn save_as(&self, path: &Path) -> Result<(), CatalogError> {
        self.catalog.write().save_as(path)
    }

    /// A copy of the current catalog.
    pub fn catalog(&self) -> SoundCatalog {
        self.catalog.read().clone()
    }

    /// Looks up a sound by ID, ignoring case.
    pub fn sound(&self, id: &str) -> Option<Sound> {
        self.session(id).map(|session| session.sound().clone())
    }

    fn session(&self, id: &str) -> Option<Arc<SoundSession>> {
        self.sessions
            .read()
            .iter()
            .find(|session| session.sound().id().eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Starts every sound with a cue of the given name, restarting any that are already
    /// playing. Unknown cue names do nothing.
    pub fn play_cue(&self, cue_name: &str) -> Vec<Playback> {
        self.start_cue(cue_name)
            .into_iter()
            .filter_map(|(_, playback)| playback)
            .collect()
    }

    fn start_cue(&self, cue_name: &str) -> Vec<(Arc<SoundSession>, Option<Playback>)> {
        let matching: Vec<(Arc<SoundSession>, Vec<Cue>)> = self
            .sessions
            .read()
            .iter()
            .filter_map(|session| {
                let cues: Vec<Cue> = session.sound().cues_named(cue_name).cloned().collect();
                (!cues.is_empty()).then(|| (session.clone(), cues))
            })
            .collect();

        matching
            .into_iter()
            .map(|(session, cues)| {
                // A sound with several matching cues restarts once per cue. The last one wins.
                let playback = cues
                    .iter()
                    .filter_map(|cue| session.play(Some(cue)).ok())
                    .last();
                (session, playback)
            })
            .collect()
    }

    /// Starts the matching sounds and blocks until each has ended. Looping sounds block
    /// until they're stopped from elsewhere.
    pub fn play_cue_and_wait(&self, cue_name: &str) -> Vec<Playback> {
        let started = self.start_cue(cue_name);
        for (session, _) in started.iter() {
            wait_for(session);
        }
        started
            .into_iter()
            .filter_map(|(_, playback)| playback)
            .collect()
    }

    /// Stops every sound with a cue of the given name.
    pub fn stop_cue(&self, cue_name: &str) {
        for session in self.sessions.read().iter() {
            if session.sound().has_cue(cue_name) {
                session.stop();
            }
        }
    }

    /// Plays a single sound. Without a cue name the whole file plays unmodified.
    pub fn play_sound(&self, id: &str, cue_name: Option<&str>) -> Result<Playback, Box<dyn Error>> {
        let session = self
            .session(id)
            .ok_or_else(|| format!("no sound with ID {}", id))?;
        let cue = match cue_name {
            Some(name) => Some(
                session
                    .sound()
                    .cues_named(name)
                    .next()
                    .cloned()
                    .ok_or_else(|| format!("sound {} has no cue named {}", id, name))?,
            ),
            None => None,
        };
        session.play(cue.as_ref())
    }

    /// Stops a single sound. Unknown IDs are ignored.
    pub fn stop_sound(&self, id: &str) {
        match self.session(id) {
            Some(session) => session.stop(),
            None => warn!(sound = id, "No sound to stop."),
        }
    }

    pub fn stop_all(&self) {
        for session in self.sessions.read().iter() {
            session.stop();
        }
    }

    pub fn is_playing(&self, id: &str) -> bool {
        self.session(id).is_some_and(|session| session.is_playing())
    }

    /// The cue the sound was last started with.
    pub fn active_cue(&self, id: &str) -> Option<Cue> {
        self.session(id).and_then(|session| session.active_cue())
    }
}

/// Blocks until the session stops, following it across loop restarts.
fn wait_for(session: &SoundSession) {
    while session.is_enabled() {
        match session.current_playback() {
            Some(playback) if playback.state() == PlaybackState::Playing => playback.wait(),
            // Ended but the completion hasn't run yet.
            _ => thread::sleep(Duration::from_millis(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use crate::{
        audio::{self, mock},
        config::catalog_path_for,
        testutil::{eventually, write_wav},
    };

    use super::*;

    struct Fixture {
        _tempdir: tempfile::TempDir,
        dir: PathBuf,
        dispatcher: Arc<CueDispatcher>,
        sink: Arc<mock::Sink>,
    }

    /// Two ramps, one looping, sharing the cue "both".
    fn fixture() -> Fixture {
        let tempdir = tempfile::tempdir().unwrap();
        let dir = tempdir.path().to_path_buf();
        let ramp: Vec<f32> = (0..4410).map(|i| i as f32 / 4410.0).collect();
        write_wav(&dir.join("a.wav"), &ramp, 44100).unwrap();
        write_wav(&dir.join("b.wav"), &ramp, 44100).unwrap();

        let catalog = SoundCatalog::new(vec![
            Sound::new(
                "a.wav",
                "a.wav",
                false,
                vec![
                    Cue::new("Grid(0,0)").with_start(Duration::from_millis(50)),
                    Cue::new("both"),
                ],
            ),
            Sound::new("b.wav", "b.wav", true, vec![Cue::new("both")]),
        ]);
        let catalog_path = catalog_path_for(&dir);
        fs::write(&catalog_path, serde_json::to_string(&catalog).unwrap()).unwrap();

        let sink = audio::get_sink("mock-out").unwrap();
        let mock = sink.to_mock().unwrap();
        let dispatcher = Arc::new(CueDispatcher::new(sink));
        dispatcher.load(&catalog_path).unwrap();

        Fixture {
            _tempdir: tempdir,
            dir,
            dispatcher,
            sink: mock,
        }
    }

    #[test]
    fn test_retrigger_restarts_from_offset() {
        let f = fixture();
        assert_eq!(f.dispatcher.play_cue("Grid(0,0)").len(), 1);
        assert_eq!(f.dispatcher.play_cue("Grid(0,0)").len(), 1);

        assert_eq!(f.sink.play_count(), 2);
        assert_eq!(f.sink.live_count(), 1);
        let frames = f.sink.pull_frames(1, 1).unwrap();
        assert_eq!(frames[0][0], 0.5);
        assert!(f.dispatcher.is_playing("A.WAV"));
        assert_eq!(
            f.dispatcher.active_cue("a.wav").map(|cue| cue.name().to_string()),
            Some("Grid(0,0)".to_string())
        );
    }

    #[test]
    fn test_cue_fans_out_to_sounds() {
        let f = fixture();
        assert_eq!(f.dispatcher.play_cue("both").len(), 2);
        assert_eq!(f.sink.live_count(), 2);

        // Only the looping sound comes back.
        assert_eq!(f.sink.finish_all(), 2);
        assert_eq!(f.sink.live_count(), 1);
        assert!(!f.dispatcher.is_playing("a.wav"));
        assert!(f.dispatcher.is_playing("b.wav"));
    }

    #[test]
    fn test_stop_cue_breaks_loop() {
        let f = fixture();
        f.dispatcher.play_cue("both");
        let first_loop = f.sink.playback(1).unwrap();

        f.dispatcher.stop_cue("both");
        assert_eq!(first_loop.state(), PlaybackState::Stopped);
        assert_eq!(f.sink.finish_all(), 0);
        assert_eq!(f.sink.play_count(), 2);
        assert!(!f.dispatcher.is_playing("b.wav"));
    }

    #[test]
    fn test_queued_completion_does_not_restart_loop() {
        let f = fixture();
        f.dispatcher.play_cue("both");
        let queued = f.sink.take_completion(1).unwrap();

        f.dispatcher.stop_cue("both");
        queued();
        assert_eq!(f.sink.play_count(), 2);
        assert!(!f.dispatcher.is_playing("b.wav"));
    }

    #[test]
    fn test_queued_completion_from_replaced_loop_is_ignored() {
        let f = fixture();
        f.dispatcher.play_cue("both");
        let queued = f.sink.take_completion(1).unwrap();

        // Retriggering replaces the loop's playback before the old completion runs.
        f.dispatcher.play_cue("both");
        queued();
        assert_eq!(f.sink.play_count(), 4);
        assert_eq!(f.sink.live_count(), 2);
    }

    #[test]
    fn test_unknown_cue_does_nothing() {
        let f = fixture();
        assert!(f.dispatcher.play_cue("Grid(7,7)").is_empty());
        f.dispatcher.stop_cue("Grid(7,7)");
        assert_eq!(f.sink.play_count(), 0);
    }

    #[test]
    fn test_play_and_stop_sound() {
        let f = fixture();
        assert!(f.dispatcher.play_sound("missing.wav", None).is_err());
        assert!(f.dispatcher.play_sound("a.wav", Some("nope")).is_err());

        let playback = f.dispatcher.play_sound("a.wav", None).unwrap();
        assert_eq!(f.sink.pull_frames(0, 1).unwrap()[0][0], 0.0);
        assert_eq!(f.dispatcher.active_cue("a.wav"), None);

        f.dispatcher.stop_sound("a.wav");
        assert_eq!(playback.state(), PlaybackState::Stopped);
        f.dispatcher.stop_sound("missing.wav");
    }

    #[test]
    fn test_play_cue_and_wait() {
        let f = fixture();
        let dispatcher = f.dispatcher.clone();
        let waiter = thread::spawn(move || dispatcher.play_cue_and_wait("Grid(0,0)"));

        eventually(|| f.sink.live_count() == 1, "Cue never started");
        assert!(!waiter.is_finished());
        f.sink.finish_all();

        let playbacks = waiter.join().unwrap();
        assert_eq!(playbacks.len(), 1);
        assert_eq!(playbacks[0].state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_reload_disposes_sessions() {
        let f = fixture();
        f.dispatcher.play_cue("both");
        assert_eq!(f.sink.live_count(), 2);

        f.dispatcher.load_or_build(&f.dir).unwrap();
        assert_eq!(f.sink.live_count(), 0);
        assert_eq!(f.dispatcher.catalog().sounds().len(), 2);
        assert!(f.dispatcher.sound("b.wav").is_some_and(|sound| sound.is_looping()));
    }
}
