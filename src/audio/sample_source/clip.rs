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
use std::{sync::Arc, time::Duration};

use super::{
    error::SampleSourceError,
    traits::{check_output, frames_for, SampleSource},
};

/// Plays a decoded clip held in memory. The interleaved data is shared between every source
/// created from the same clip.
pub struct ClipSource {
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
    current_frame: usize,
}

impl ClipSource {
    pub fn new(data: Arc<Vec<f32>>, channel_count: u16, sample_rate: u32) -> ClipSource {
        ClipSource {
            data,
            channel_count: channel_count.max(1),
            sample_rate,
            current_frame: 0,
        }
    }

    fn total_frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Moves the read position to the given offset from the start of the clip. Offsets past
    /// the end leave the source exhausted.
    pub fn seek(&mut self, offset: Duration) {
        let frame = frames_for(offset, self.sample_rate) as usize;
        self.current_frame = frame.min(self.total_frames());
    }
}

impl SampleSource for ClipSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_output(output, self.channel_count)?;
        for channel in output.iter_mut() {
            channel.clear();
        }

        let channels = self.channel_count as usize;
        let to_copy = self
            .total_frames()
            .saturating_sub(self.current_frame)
            .min(max_frames);
        let start = self.current_frame * channels;
        for frame in self.data[start..start + to_copy * channels].chunks_exact(channels) {
            for (channel, sample) in output.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        self.current_frame += to_copy;

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn remaining_frames(&self) -> Option<u64> {
        Some(self.total_frames().saturating_sub(self.current_frame) as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::sample_source::traits::SampleSourceTestExt;

    use super::*;

    #[test]
    fn test_deinterleaves() {
        let mut source = ClipSource::new(Arc::new(vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]), 2, 10);
        let mut chunk = vec![Vec::new(); 2];

        assert_eq!(source.next_chunk(&mut chunk, 2).unwrap(), 2);
        assert_eq!(chunk, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        assert_eq!(source.remaining_frames(), Some(1));

        assert_eq!(source.next_chunk(&mut chunk, 2).unwrap(), 1);
        assert_eq!(chunk, vec![vec![3.0], vec![-3.0]]);
        assert_eq!(source.next_chunk(&mut chunk, 2).unwrap(), 0);
    }

    #[test]
    fn test_seek() {
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut source = ClipSource::new(Arc::new(data), 1, 100);

        source.seek(Duration::from_millis(250));
        assert_eq!(source.remaining_frames(), Some(75));
        assert_eq!(source.drain()[0][0], 25.0);

        source.seek(Duration::from_secs(5));
        assert_eq!(source.remaining_frames(), Some(0));
    }

    #[test]
    fn test_wrong_output_channels() {
        let mut source = ClipSource::new(Arc::new(vec![0.0; 4]), 2, 10);
        assert!(source.next_chunk(&mut [Vec::new()], 1).is_err());
    }
}
