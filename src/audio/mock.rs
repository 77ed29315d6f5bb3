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
use std::{error::Error, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, span, Level};

use super::{
    sample_source::{SampleSource, SampleSourceError},
    Completion, Playback, PlaybackState,
};

struct MockPlay {
    playback: Playback,
    source: Box<dyn SampleSource>,
    on_finished: Option<Completion>,
}

/// A mock sink. Doesn't actually play anything; playbacks end when [`Sink::finish`] or
/// [`Sink::finish_all`] is called.
#[derive(Clone)]
pub struct Sink {
    name: String,
    sample_rate: u32,
    num_channels: u16,
    plays: Arc<Mutex<Vec<MockPlay>>>,
}

impl Sink {
    /// Gets the given mock sink.
    pub fn get(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            sample_rate: 44100,
            num_channels: 2,
            plays: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the number of sources ever played.
    pub fn play_count(&self) -> usize {
        self.plays.lock().len()
    }

    /// Returns the number of playbacks that are still playing.
    pub fn live_count(&self) -> usize {
        self.plays
            .lock()
            .iter()
            .filter(|play| play.playback.state() == PlaybackState::Playing)
            .count()
    }

    /// Returns the playback started by the given play.
    pub fn playback(&self, index: usize) -> Option<Playback> {
        self.plays
            .lock()
            .get(index)
            .map(|play| play.playback.clone())
    }

    /// Pulls frames from the source of the given play.
    pub fn pull_frames(
        &self,
        index: usize,
        max_frames: usize,
    ) -> Result<Vec<Vec<f32>>, SampleSourceError> {
        let mut plays = self.plays.lock();
        let Some(play) = plays.get_mut(index) else {
            return Ok(Vec::new());
        };
        let mut output = vec![Vec::new(); play.source.channel_count() as usize];
        play.source.next_chunk(&mut output, max_frames)?;
        Ok(output)
    }

    /// Ends the given play as if it reached the end of its source. Returns false if it had
    /// already ended or been stopped.
    pub fn finish(&self, index: usize) -> bool {
        let completion = {
            let mut plays = self.plays.lock();
            plays.get_mut(index).and_then(Self::end)
        };
        match completion {
            Some(completion) => {
                completion();
                true
            }
            None => false,
        }
    }

    /// Ends every live play. Completions started by these plays are not ended.
    pub fn finish_all(&self) -> usize {
        let completions: Vec<Completion> = {
            let mut plays = self.plays.lock();
            plays.iter_mut().filter_map(Self::end).collect()
        };
        let count = completions.len();
        for completion in completions {
            completion();
        }
        count
    }

    /// Takes the completion of a live play without ending it, so a test can run it later as
    /// if it had been queued just before the play was stopped.
    pub fn take_completion(&self, index: usize) -> Option<Completion> {
        let mut plays = self.plays.lock();
        let play = plays.get_mut(index)?;
        if play.playback.state() != PlaybackState::Playing {
            return None;
        }
        play.on_finished.take()
    }

    fn end(play: &mut MockPlay) -> Option<Completion> {
        if play.playback.state() != PlaybackState::Playing {
            return None;
        }
        play.playback.finished_flag().store(true, std::sync::atomic::Ordering::Relaxed);
        play.playback.cancel_handle().notify();
        play.on_finished.take()
    }
}

impl super::Sink for Sink {
    fn play(
        &self,
        source: Box<dyn SampleSource>,
        on_finished: Completion,
    ) -> Result<Playback, Box<dyn Error>> {
        let span = span!(Level::INFO, "play (mock)");
        let _enter = span.enter();

        let playback = Playback::new();
        debug!(device = self.name, playback = playback.id(), "Playing.");
        self.plays.lock().push(MockPlay {
            playback: playback.clone(),
            source,
            on_finished: Some(on_finished),
        });
        Ok(playback)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.num_channels
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Sink>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
