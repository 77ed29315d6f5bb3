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
use std::{error::Error, fmt, thread};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SizedSample,
};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use super::{
    mixer::{ActiveSource, AudioMixer},
    sample_source::SampleSource,
    Completion, Playback,
};

/// An output device driven by cpal. A single stream stays open for the life of the sink and
/// every playback is mixed into it.
pub struct Sink {
    name: String,
    host_id: cpal::HostId,
    num_channels: u16,
    sample_rate: u32,
    source_tx: Sender<ActiveSource>,
    /// Dropping this ends the output thread.
    shutdown_tx: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
    notifier_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.num_channels,
            self.host_id.name()
        )
    }
}

/// Builds an output stream that mixes the active sources into samples of type T.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: AudioMixer,
    source_rx: Receiver<ActiveSource>,
    completion_tx: Sender<Completion>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let num_channels = config.channels.max(1) as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(source) = source_rx.try_recv() {
                mixer.add_source(source);
            }

            let num_frames = data.len() / num_channels;
            scratch.resize(num_frames * num_channels, 0.0);
            for completion in mixer.process_into_output(&mut scratch, num_frames) {
                // Completions run on the notifier thread, never on the audio thread.
                if completion_tx.send(completion).is_err() {
                    error!("Playback notifier has exited");
                }
            }

            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!(err = %err, "CPAL output stream error"),
        None,
    )
}

impl Sink {
    /// Lists the names of all output devices.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut names = Vec::new();
        for host_id in cpal::available_hosts() {
            let devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!(
                        err = %e,
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };
            for device in devices {
                if let Ok(name) = device.name() {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Opens the named output device, or the host default for "default".
    pub fn get(name: &str) -> Result<Sink, Box<dyn Error>> {
        let span = span!(Level::INFO, "open sink (cpal)");
        let _enter = span.enter();

        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
                .ok_or("no default output device")?
        } else {
            host.output_devices()?
                .find(|device| device.name().is_ok_and(|n| n.trim() == name))
                .ok_or_else(|| format!("no device found with name {}", name))?
        };

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();
        let num_channels = config.channels;
        let sample_rate = config.sample_rate.0;

        let (source_tx, source_rx) = crossbeam_channel::unbounded::<ActiveSource>();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded::<Completion>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let notifier_thread = thread::Builder::new()
            .name("cuepad-playback-notifier".to_string())
            .spawn(move || {
                for completion in completion_rx {
                    completion();
                }
            })?;

        // cpal streams can't move between threads, so the stream lives on its own thread.
        let output_thread = thread::Builder::new()
            .name("cuepad-output".to_string())
            .spawn(move || {
                let mixer = AudioMixer::new(num_channels, sample_rate);
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_stream::<f32>(&device, &config, mixer, source_rx, completion_tx)
                    }
                    cpal::SampleFormat::I16 => {
                        build_stream::<i16>(&device, &config, mixer, source_rx, completion_tx)
                    }
                    cpal::SampleFormat::I32 => {
                        build_stream::<i32>(&device, &config, mixer, source_rx, completion_tx)
                    }
                    cpal::SampleFormat::U16 => {
                        build_stream::<u16>(&device, &config, mixer, source_rx, completion_tx)
                    }
                    other => {
                        let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to create stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the sink is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err("output thread exited before starting".into()),
        }

        info!(
            device = name,
            channels = num_channels,
            sample_rate,
            "CPAL output stream started"
        );

        Ok(Sink {
            name: name.to_string(),
            host_id: host.id(),
            num_channels,
            sample_rate,
            source_tx,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
            notifier_thread: Some(notifier_thread),
        })
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        let current = thread::current().id();
        for handle in [self.output_thread.take(), self.notifier_thread.take()]
            .into_iter()
            .flatten()
        {
            // The last reference may be released by a completion on the notifier thread.
            if handle.thread().id() != current && handle.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }
}

impl super::Sink for Sink {
    fn play(
        &self,
        source: Box<dyn SampleSource>,
        on_finished: Completion,
    ) -> Result<Playback, Box<dyn Error>> {
        let playback = Playback::new();
        let active_source = ActiveSource::new(
            playback.id(),
            source,
            playback.finished_flag(),
            playback.cancel_handle(),
            on_finished,
        );
        self.source_tx
            .send(active_source)
            .map_err(|_| format!("output stream for {} is closed", self.name))?;
        Ok(playback)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.num_channels
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<std::sync::Arc<super::mock::Sink>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
