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
//! Playback for a single sound. A sound has at most one live playback: starting a new one
//! stops the previous one first.

use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::{
    audio::{
        loader::ClipLoader,
        sample_source::{FadeSource, PitchSource, SampleSource, SampleSourceError},
        Playback, PlaybackState, Sink,
    },
    config::{Cue, Sound},
};

#[derive(Default)]
struct SessionState {
    /// Cleared by stop. A looping sound only restarts while this is set.
    enabled: bool,
    active_cue: Option<Cue>,
    playback: Option<Playback>,
    /// Bumped on every start and stop so completions from older playbacks are ignored.
    generation: u64,
}

/// The runtime state of one sound in the catalog.
pub struct SoundSession {
    sound: Sound,
    path: PathBuf,
    sink: Arc<dyn Sink>,
    loader: Arc<ClipLoader>,
    state: Mutex<SessionState>,
}

impl SoundSession {
    pub fn new(
        sound: Sound,
        path: PathBuf,
        sink: Arc<dyn Sink>,
        loader: Arc<ClipLoader>,
    ) -> Arc<SoundSession> {
        Arc::new(SoundSession {
            sound,
            path,
            sink,
            loader,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn sound(&self) -> &Sound {
        &self.sound
    }

    /// The resolved path of the sound's file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops any current playback and starts the sound with the given cue. Without a cue the
    /// whole file plays unmodified.
    pub fn play(self: &Arc<Self>, cue: Option<&Cue>) -> Result<Playback, Box<dyn Error>> {
        let mut state = self.state.lock();
        self.start(&mut state, cue.cloned())
    }

    fn start(
        self: &Arc<Self>,
        state: &mut SessionState,
        cue: Option<Cue>,
    ) -> Result<Playback, Box<dyn Error>> {
        if let Some(playback) = state.playback.take() {
            playback.stop();
        }
        state.generation += 1;
        state.enabled = true;
        state.active_cue = cue.clone();

        let generation = state.generation;
        let session = Arc::downgrade(self);
        let started = self
            .build_source(cue.as_ref())
            .map_err(Box::<dyn Error>::from)
            .and_then(|source| {
                self.sink.play(
                    source,
                    Box::new(move || {
                        if let Some(session) = session.upgrade() {
                            session.on_finished(generation);
                        }
                    }),
                )
            });

        match started {
            Ok(playback) => {
                info!(
                    sound = self.sound.id(),
                    cue = cue.as_ref().map(Cue::name).unwrap_or_default(),
                    playback = playback.id(),
                    "Playing."
                );
                state.playback = Some(playback.clone());
                Ok(playback)
            }
            Err(e) => {
                state.enabled = false;
                error!(sound = self.sound.id(), path = ?self.path, err = %e, "Unable to play sound.");
                Err(e)
            }
        }
    }

    /// Builds the source chain for a cue: seek, then fades, then pitch.
    fn build_source(&self, cue: Option<&Cue>) -> Result<Box<dyn SampleSource>, SampleSourceError> {
        let clip = self.loader.load(&self.path)?;
        let mut source = clip.create_source();
        let Some(cue) = cue else {
            return Ok(Box::new(source));
        };

        source.seek(cue.start());
        let mut faded = FadeSource::new(source, cue.start_silent());
        faded.begin_fade_in(cue.fade_in());
        faded.set_fade_out(cue.fade_out());
        Ok(Box::new(PitchSource::new(faded, cue.pitch())))
    }

    /// Runs on the sink's thread when a playback reaches its end.
    fn on_finished(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.playback = None;

        if self.sound.is_looping() && state.enabled {
            debug!(sound = self.sound.id(), "Looping.");
            let cue = state.active_cue.clone();
            // Errors are logged by start, which also disables the sound.
            let _ = self.start(&mut state, cue);
        } else {
            state.enabled = false;
        }
    }

    /// Stops the sound and breaks any loop. Stopping a stopped sound does nothing.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        state.generation += 1;
        if let Some(playback) = state.playback.take() {
            info!(sound = self.sound.id(), "Stopping.");
            playback.stop();
        }
    }

    /// Whether the sound has live output.
    pub fn is_playing(&self) -> bool {
        self.state
            .lock()
            .playback
            .as_ref()
            .is_some_and(|playback| playback.state() == PlaybackState::Playing)
    }

    /// Whether the sound was started and hasn't finished or been stopped. A looping sound
    /// stays enabled between restarts.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn active_cue(&self) -> Option<Cue> {
        self.state.lock().active_cue.clone()
    }

    pub fn current_playback(&self) -> Option<Playback> {
        self.state.lock().playback.clone()
    }
}
