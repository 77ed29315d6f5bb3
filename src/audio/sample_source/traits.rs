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
use super::error::SampleSourceError;

/// A source of audio samples that produces chunks in planar format.
pub trait SampleSource: Send {
    /// Writes up to `max_frames` frames into `output`, one Vec per channel. Each channel Vec
    /// is cleared first. Returns the number of frames written, with 0 meaning the source is
    /// exhausted.
    ///
    /// The output slice must have exactly channel_count() elements.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError>;

    /// Get the number of channels in this source
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this source
    fn sample_rate(&self) -> u32;

    /// The number of frames left before the source is exhausted, if known.
    fn remaining_frames(&self) -> Option<u64> {
        None
    }
}

impl SampleSource for Box<dyn SampleSource> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        (**self).next_chunk(output, max_frames)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn remaining_frames(&self) -> Option<u64> {
        (**self).remaining_frames()
    }
}

/// Checks that an output buffer matches the source's channel count.
pub(crate) fn check_output(
    output: &[Vec<f32>],
    channel_count: u16,
) -> Result<(), SampleSourceError> {
    if output.len() != channel_count as usize {
        return Err(SampleSourceError::SampleConversionFailed(format!(
            "Output has {} channels, expected {}",
            output.len(),
            channel_count
        )));
    }
    Ok(())
}

/// Converts a duration into a frame count at the given sample rate.
pub(crate) fn frames_for(duration: std::time::Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}

#[cfg(test)]
pub(crate) trait SampleSourceTestExt: SampleSource {
    /// Drains the source and returns its samples, one Vec per channel.
    fn drain(&mut self) -> Vec<Vec<f32>> {
        let channels = self.channel_count() as usize;
        let mut drained = vec![Vec::new(); channels];
        let mut chunk = vec![Vec::new(); channels];
        while self.next_chunk(&mut chunk, 256).unwrap() > 0 {
            for (all, part) in drained.iter_mut().zip(chunk.iter()) {
                all.extend_from_slice(part);
            }
        }
        drained
    }
}

#[cfg(test)]
impl<S: SampleSource + ?Sized> SampleSourceTestExt for S {}
