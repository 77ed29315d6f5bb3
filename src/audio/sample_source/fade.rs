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
use std::time::Duration;

use super::{
    error::SampleSourceError,
    traits::{frames_for, SampleSource},
};

#[derive(Clone, Copy, Debug, PartialEq)]
enum FadeIn {
    Silent,
    Fading { position: u64, length: u64 },
    Full,
}

impl FadeIn {
    fn gain(&self) -> f32 {
        match self {
            FadeIn::Silent => 0.0,
            FadeIn::Fading { position, length } => *position as f32 / *length as f32,
            FadeIn::Full => 1.0,
        }
    }

    fn advance(&mut self) {
        if let FadeIn::Fading { position, length } = self {
            *position += 1;
            if *position >= *length {
                *self = FadeIn::Full;
            }
        }
    }
}

/// Applies a linear fade-in from the start and a linear fade-out over the last frames of the
/// wrapped source.
pub struct FadeSource<S: SampleSource> {
    inner: S,
    fade_in: FadeIn,
    fade_out_frames: u64,
}

impl<S: SampleSource> FadeSource<S> {
    /// Wraps a source. A silent source stays silent until [`FadeSource::begin_fade_in`].
    pub fn new(inner: S, start_silent: bool) -> FadeSource<S> {
        FadeSource {
            inner,
            fade_in: if start_silent {
                FadeIn::Silent
            } else {
                FadeIn::Full
            },
            fade_out_frames: 0,
        }
    }

    /// Ramps the gain up from its current level over the given duration. A zero duration
    /// leaves the gain unchanged.
    pub fn begin_fade_in(&mut self, duration: Duration) {
        let length = frames_for(duration, self.inner.sample_rate());
        if length > 0 {
            self.fade_in = FadeIn::Fading {
                position: 0,
                length,
            };
        }
    }

    /// Fades out over the last `duration` of the source. Only applies to sources that know
    /// how many frames remain.
    pub fn set_fade_out(&mut self, duration: Duration) {
        self.fade_out_frames = frames_for(duration, self.inner.sample_rate());
    }

    fn fade_out_gain(&self, remaining_after: u64) -> f32 {
        if self.fade_out_frames == 0 {
            return 1.0;
        }
        (remaining_after as f32 / self.fade_out_frames as f32).min(1.0)
    }
}

impl<S: SampleSource> SampleSource for FadeSource<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let remaining = self.inner.remaining_frames();
        let frames = self.inner.next_chunk(output, max_frames)?;

        if self.fade_in == FadeIn::Full && (self.fade_out_frames == 0 || remaining.is_none()) {
            return Ok(frames);
        }

        for frame in 0..frames {
            let fade_out = match remaining {
                Some(remaining) => {
                    self.fade_out_gain(remaining.saturating_sub(frame as u64 + 1))
                }
                None => 1.0,
            };
            let gain = self.fade_in.gain() * fade_out;
            for channel in output.iter_mut() {
                channel[frame] *= gain;
            }
            self.fade_in.advance();
        }

        Ok(frames)
    }

    fn channel_count(&self) -> u16 {
        self.inner.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn remaining_frames(&self) -> Option<u64> {
        self.inner.remaining_frames()
    }
}
