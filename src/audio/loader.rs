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
//! Clip loading and caching.
//!
//! Clips are decoded entirely into memory and converted to the output sample rate, so a cue
//! can start without touching the disk.

use std::{
    collections::HashMap,
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::sample_source::{ClipSource, SampleSourceError};

/// A decoded clip. The sample data is stored in an Arc so sources can share it.
#[derive(Clone)]
pub struct LoadedClip {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl LoadedClip {
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> LoadedClip {
        LoadedClip {
            data: Arc::new(data),
            channel_count,
            sample_rate,
        }
    }

    /// Creates a new source that plays the clip from the start.
    pub fn create_source(&self) -> ClipSource {
        ClipSource::new(self.data.clone(), self.channel_count, self.sample_rate)
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        let frames = self.data.len() / self.channel_count.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Decodes clips and caches them by path.
pub struct ClipLoader {
    cache: Mutex<HashMap<PathBuf, LoadedClip>>,
    /// Target sample rate for transcoding (matches audio output).
    target_sample_rate: u32,
}

impl ClipLoader {
    pub fn new(target_sample_rate: u32) -> ClipLoader {
        ClipLoader {
            cache: Mutex::new(HashMap::new()),
            target_sample_rate,
        }
    }

    /// Loads a clip, returning the cached copy if it was loaded before.
    pub fn load(&self, path: &Path) -> Result<LoadedClip, SampleSourceError> {
        if let Some(clip) = self.cache.lock().get(path) {
            debug!(path = ?path, "Using cached clip");
            return Ok(clip.clone());
        }

        info!(path = ?path, "Loading clip into memory");
        let (samples, channel_count, source_rate) = decode(path)?;

        let samples = if source_rate != self.target_sample_rate {
            info!(
                source_rate,
                target_rate = self.target_sample_rate,
                "Transcoding clip"
            );
            transcode_samples(&samples, channel_count, source_rate, self.target_sample_rate)
        } else {
            samples
        };

        let clip = LoadedClip::new(samples, channel_count, self.target_sample_rate);
        info!(
            path = ?path,
            channels = channel_count,
            sample_rate = self.target_sample_rate,
            duration_ms = clip.duration().as_millis(),
            memory_kb = clip.memory_size() / 1024,
            "Clip loaded"
        );

        self.cache.lock().insert(path.to_path_buf(), clip.clone());
        Ok(clip)
    }

    /// Drops every cached clip.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }
}

impl std::fmt::Debug for ClipLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipLoader")
            .field("cached_clips", &self.cached_count())
            .field("target_sample_rate", &self.target_sample_rate)
            .finish()
    }
}

/// Decodes the first audio track of a file into interleaved f32 samples. Returns the samples,
/// the channel count, and the sample rate.
fn decode(path: &Path) -> Result<(Vec<f32>, u16, u32), SampleSourceError> {
    let file = File::open(path).map_err(|e| {
        SampleSourceError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            SampleSourceError::SampleConversionFailed(format!("'{}': {}", path.display(), e))
        })?;
    let mut format_reader = probed.format;

    let params = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| SampleSourceError::NoAudioTrack(path.display().to_string()))?;
    let (track_id, params) = params;

    let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;
    let mut sample_rate = params.sample_rate;
    let mut channel_count = params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channel_count.get_or_insert(spec.channels.count() as u16);
                if decoded.frames() == 0 {
                    continue;
                }
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = ?path, err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    match (channel_count, sample_rate) {
        (Some(channels), Some(rate)) if channels > 0 && rate > 0 => Ok((samples, channels, rate)),
        _ => Err(SampleSourceError::SampleConversionFailed(format!(
            "'{}': unable to determine channels and sample rate",
            path.display()
        ))),
    }
}

/// Transcodes samples from one sample rate to another using linear interpolation.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use crate::audio::sample_source::traits::SampleSourceTestExt;
    use crate::testutil::write_wav;

    use super::*;

    #[test]
    fn test_transcode_samples() {
        let source_rate = 44100;
        let target_rate = 48000;
        let source_samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = transcode_samples(&source_samples, 1, source_rate, target_rate);

        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.len(), expected_len);
    }

    #[test]
    fn test_transcode_stereo() {
        let source_samples = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

        let result = transcode_samples(&source_samples, 2, 44100, 48000);

        assert!(result.len() >= 8);
        assert!((result[0] - 1.0).abs() < 0.1);
        assert!((result[1] - (-1.0)).abs() < 0.1);
    }

    #[test]
    fn test_load_and_cache() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("kick.wav");
        write_wav(&path, &[0.5, 0.25, -0.25, -0.5], 44100).unwrap();

        let loader = ClipLoader::new(44100);
        let clip = loader.load(&path).unwrap();
        assert_eq!(clip.channel_count(), 1);
        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(
            clip.create_source().drain(),
            vec![vec![0.5, 0.25, -0.25, -0.5]]
        );
        assert_eq!(loader.cached_count(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(loader.load(&path).is_ok());

        loader.clear();
        assert!(loader.load(&path).is_err());
    }

    #[test]
    fn test_load_resamples() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("tone.wav");
        write_wav(&path, &vec![0.1; 22050], 22050).unwrap();

        let loader = ClipLoader::new(44100);
        let clip = loader.load(&path).unwrap();
        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_garbage() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(ClipLoader::new(44100).load(&path).is_err());
    }
}
