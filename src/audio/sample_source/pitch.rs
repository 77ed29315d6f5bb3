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
use std::collections::VecDeque;

use signalsmith_stretch::Stretch;

use super::{
    error::SampleSourceError,
    traits::{check_output, SampleSource},
};

/// Where the stretcher is in the clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    /// Pulling frames from the inner source.
    Input,
    /// The input ended. Feeding this many frames of silence to push out the input latency.
    Padding(usize),
    /// Draining the output latency.
    Flush,
    Done,
}

/// Shifts pitch without changing duration, using signalsmith-stretch.
///
/// The stretcher's latency is removed: the first `input_latency + output_latency` frames it
/// produces are dropped, and the stretcher is padded and flushed once the inner source ends.
/// The output lines up with the input and has the same length.
pub struct PitchSource<S: SampleSource> {
    inner: S,
    factor: f32,
    /// None for a factor of 1.0, which passes the inner source through untouched.
    stretch: Option<Stretch>,
    stage: Stage,
    /// Output frames still to drop.
    skip: usize,
    /// The number of frames the source will produce, if the inner source knows.
    total_frames: Option<u64>,
    emitted: u64,
    chunk: Vec<Vec<f32>>,
    input: Vec<f32>,
    output: Vec<f32>,
    /// Interleaved frames produced by the stretcher that haven't been handed out yet.
    pending: VecDeque<f32>,
}

impl<S: SampleSource> PitchSource<S> {
    /// Wraps a source. A factor of 2.0 is an octave up, 0.5 an octave down. Factors that
    /// aren't positive are treated as 1.0.
    pub fn new(inner: S, factor: f32) -> PitchSource<S> {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        let channels = inner.channel_count() as usize;

        let stretch = (factor != 1.0).then(|| {
            let mut stretch = Stretch::preset_default(channels as u32, inner.sample_rate());
            stretch.set_transpose_factor(factor, None);
            stretch
        });
        let skip = stretch
            .as_ref()
            .map(|stretch| stretch.input_latency() + stretch.output_latency())
            .unwrap_or(0);

        PitchSource {
            total_frames: inner.remaining_frames(),
            inner,
            factor,
            stretch,
            stage: Stage::Input,
            skip,
            emitted: 0,
            chunk: vec![Vec::new(); channels],
            input: Vec::new(),
            output: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Runs the stretcher one step and queues what it produced. Returns false once there is
    /// nothing left to produce.
    fn refill(&mut self, max_frames: usize) -> Result<bool, SampleSourceError> {
        let channels = self.chunk.len();
        let Some(stretch) = self.stretch.as_mut() else {
            return Ok(false);
        };

        match self.stage {
            Stage::Input => {
                let frames = self.inner.next_chunk(&mut self.chunk, max_frames)?;
                if frames == 0 {
                    self.stage = Stage::Padding(stretch.input_latency());
                    return Ok(true);
                }
                self.input.clear();
                for frame in 0..frames {
                    self.input.extend(self.chunk.iter().map(|channel| channel[frame]));
                }
                self.output.clear();
                self.output.resize(frames * channels, 0.0);
                stretch.process(&self.input[..], &mut self.output[..]);
            }
            Stage::Padding(left) => {
                if left == 0 {
                    self.stage = Stage::Flush;
                    return Ok(true);
                }
                let frames = left.min(max_frames.max(1));
                self.input.clear();
                self.input.resize(frames * channels, 0.0);
                self.output.clear();
                self.output.resize(frames * channels, 0.0);
                stretch.process(&self.input[..], &mut self.output[..]);
                self.stage = Stage::Padding(left - frames);
            }
            Stage::Flush => {
                self.output.clear();
                self.output.resize(stretch.output_latency() * channels, 0.0);
                stretch.flush(&mut self.output[..]);
                self.stage = Stage::Done;
            }
            Stage::Done => return Ok(false),
        }

        let produced = self.output.len() / channels.max(1);
        let dropped = self.skip.min(produced);
        self.skip -= dropped;
        self.pending.extend(&self.output[dropped * channels..]);
        Ok(true)
    }
}

impl<S: SampleSource> SampleSource for PitchSource<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if self.stretch.is_none() {
            return self.inner.next_chunk(output, max_frames);
        }

        check_output(output, self.inner.channel_count())?;
        let channels = output.len();
        while self.pending.len() < max_frames * channels {
            if !self.refill(max_frames)? {
                break;
            }
        }

        let frames = (self.pending.len() / channels.max(1)).min(max_frames);
        for channel in output.iter_mut() {
            channel.clear();
        }
        for _ in 0..frames {
            for channel in output.iter_mut() {
                channel.push(self.pending.pop_front().unwrap_or(0.0));
            }
        }
        self.emitted += frames as u64;
        Ok(frames)
    }

    fn channel_count(&self) -> u16 {
        self.inner.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn remaining_frames(&self) -> Option<u64> {
        if self.stretch.is_none() {
            return self.inner.remaining_frames();
        }
        self.total_frames.map(|total| total.saturating_sub(self.emitted))
    }
}
