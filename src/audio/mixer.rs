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
// Core audio mixing logic, independent of the output backend.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::warn;

use super::{sample_source::SampleSource, Completion};
use crate::playsync::CancelHandle;

/// A source playing through the mixer.
pub struct ActiveSource {
    pub id: u64,
    pub source: Box<dyn SampleSource>,
    /// Set once the source plays to its end.
    pub is_finished: Arc<AtomicBool>,
    pub cancel_handle: CancelHandle,
    /// Runs when the source plays to its end. Never runs for cancelled sources.
    pub on_finished: Option<Completion>,
    scratch: Vec<Vec<f32>>,
}

impl ActiveSource {
    pub fn new(
        id: u64,
        source: Box<dyn SampleSource>,
        is_finished: Arc<AtomicBool>,
        cancel_handle: CancelHandle,
        on_finished: Completion,
    ) -> ActiveSource {
        let channels = source.channel_count() as usize;
        ActiveSource {
            id,
            source,
            is_finished,
            cancel_handle,
            on_finished: Some(on_finished),
            scratch: vec![Vec::new(); channels],
        }
    }

    /// Marks the source finished and wakes anything waiting on it. Returns its completion.
    fn finish(&mut self) -> Option<Completion> {
        self.is_finished.store(true, Ordering::Relaxed);
        self.cancel_handle.notify();
        self.on_finished.take()
    }
}

/// Sums active sources into an interleaved output buffer.
pub struct AudioMixer {
    active_sources: Vec<ActiveSource>,
    num_channels: u16,
    sample_rate: u32,
}

impl AudioMixer {
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            active_sources: Vec::new(),
            num_channels,
            sample_rate,
        }
    }

    pub fn add_source(&mut self, source: ActiveSource) {
        self.active_sources.push(source);
    }

    pub fn active_count(&self) -> usize {
        self.active_sources.len()
    }

    /// Mixes `num_frames` frames into `output`, replacing its contents. Cancelled sources are
    /// dropped. Sources that ran out are dropped and their completions returned.
    pub fn process_into_output(
        &mut self,
        output: &mut [f32],
        num_frames: usize,
    ) -> Vec<Completion> {
        let out_channels = self.num_channels as usize;
        output.fill(0.0);
        let mut completions = Vec::new();

        self.active_sources.retain_mut(|active_source| {
            if active_source.cancel_handle.is_cancelled() {
                return false;
            }

            let frames = match active_source
                .source
                .next_chunk(&mut active_source.scratch, num_frames)
            {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(id = active_source.id, err = %e, "Source failed, ending playback");
                    0
                }
            };
            if frames == 0 {
                completions.extend(active_source.finish());
                return false;
            }

            let scratch = &active_source.scratch;
            let src_channels = scratch.len();
            for frame in 0..frames {
                let out_frame = &mut output[frame * out_channels..(frame + 1) * out_channels];
                for (channel, sample) in out_frame.iter_mut().enumerate() {
                    // Mono sources go to every output. Otherwise channels wrap around.
                    *sample += scratch[channel % src_channels][frame];
                }
            }
            true
        });

        completions
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::sample_source::ClipSource;

    fn active(id: u64, samples: Vec<f32>, channels: u16, counter: Arc<AtomicUsize>) -> ActiveSource {
        ActiveSource::new(
            id,
            Box::new(ClipSource::new(Arc::new(samples), channels, 44100)),
            Arc::new(AtomicBool::new(false)),
            CancelHandle::new(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_mono_goes_to_every_channel() {
        let mut mixer = AudioMixer::new(2, 44100);
        mixer.add_source(active(1, vec![0.5, 0.8], 1, Arc::new(AtomicUsize::new(0))));

        let mut output = vec![1.0; 4];
        mixer.process_into_output(&mut output, 2);
        assert_eq!(output, vec![0.5, 0.5, 0.8, 0.8]);
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mut mixer = AudioMixer::new(2, 44100);
        let counter = Arc::new(AtomicUsize::new(0));
        mixer.add_source(active(1, vec![0.5, 0.25], 2, counter.clone()));
        mixer.add_source(active(2, vec![0.25, 0.125], 2, counter));

        let mut output = vec![0.0; 2];
        mixer.process_into_output(&mut output, 1);
        assert_eq!(output, vec![0.75, 0.375]);
    }

    #[test]
    fn test_finished_source_completes_once() {
        let mut mixer = AudioMixer::new(1, 44100);
        let counter = Arc::new(AtomicUsize::new(0));
        let source = active(1, vec![0.5; 3], 1, counter.clone());
        let is_finished = source.is_finished.clone();
        mixer.add_source(source);

        let mut output = vec![0.0; 4];
        assert!(mixer.process_into_output(&mut output, 4).is_empty());
        assert_eq!(output, vec![0.5, 0.5, 0.5, 0.0]);

        let completions = mixer.process_into_output(&mut output, 4);
        assert_eq!(completions.len(), 1);
        assert!(is_finished.load(Ordering::Relaxed));
        assert_eq!(mixer.active_count(), 0);
        for completion in completions {
            completion();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(mixer.process_into_output(&mut output, 4).is_empty());
    }

    #[test]
    fn test_cancelled_source_never_completes() {
        let mut mixer = AudioMixer::new(1, 44100);
        let counter = Arc::new(AtomicUsize::new(0));
        let source = active(1, vec![0.5; 3], 1, counter.clone());
        let cancel_handle = source.cancel_handle.clone();
        mixer.add_source(source);

        cancel_handle.cancel();
        let mut output = vec![0.0; 4];
        assert!(mixer.process_into_output(&mut output, 4).is_empty());
        assert_eq!(output, vec![0.0; 4]);
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
