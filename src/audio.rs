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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::playsync::CancelHandle;

pub mod cpal;
pub mod loader;
pub mod mixer;
pub mod mock;
pub mod sample_source;

/// Runs once when a playback plays to its end.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Counter for generating unique playback IDs.
static PLAYBACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Whether a playback is still producing audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Stopped,
}

/// A handle to a source started on a sink.
#[derive(Clone)]
pub struct Playback {
    id: u64,
    cancel_handle: CancelHandle,
    finished: Arc<AtomicBool>,
}

impl Playback {
    pub(crate) fn new() -> Playback {
        Playback {
            id: PLAYBACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            cancel_handle: CancelHandle::new(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    pub(crate) fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    /// Stops output. The completion callback will not run afterwards.
    pub fn stop(&self) {
        self.cancel_handle.cancel();
    }

    pub fn state(&self) -> PlaybackState {
        if self.finished.load(Ordering::Relaxed) || self.cancel_handle.is_cancelled() {
            PlaybackState::Stopped
        } else {
            PlaybackState::Playing
        }
    }

    /// Blocks until the playback ends or is stopped.
    pub fn wait(&self) {
        self.cancel_handle.wait(&self.finished);
    }

    /// Like [`Playback::wait`], giving up after `timeout`. Returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.cancel_handle.wait_timeout(&self.finished, timeout)
    }
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playback")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// An audio output that plays sample sources.
pub trait Sink: fmt::Display + Send + Sync {
    /// Starts playing the source. `on_finished` runs on the sink's own thread once the source
    /// plays to its end, and never after [`Playback::stop`].
    fn play(
        &self,
        source: Box<dyn sample_source::SampleSource>,
        on_finished: Completion,
    ) -> Result<Playback, Box<dyn Error>>;

    /// The rate sources should be produced at.
    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> u16;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Sink>, Box<dyn Error>>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Sink::list()
}

/// Gets a sink with the given device name. Names starting with "mock" return a mock sink.
pub fn get_sink(name: &str) -> Result<Arc<dyn Sink>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Sink::get(name)));
    }

    Ok(Arc::new(cpal::Sink::get(name)?))
}
