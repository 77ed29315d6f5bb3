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
use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{crate_version, Parser, Subcommand};
use cuepad::{audio, config, cues::CueDispatcher, pad};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays sound cues from a Launchpad."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will run the launcher until interrupted.
    Start {
        /// The path to the player config.
        player_path: String,
    },
    /// Builds the sound catalog for a media directory and prints it.
    Catalog {
        /// The directory containing the audio files.
        media_path: String,
    },
    /// Plays a cue and waits for it to finish.
    Play {
        /// The directory containing the audio files.
        media_path: String,
        /// The name of the cue to play, e.g. Grid(0,0).
        cue_name: String,
        /// The audio device to play through.
        #[arg(short, long, default_value = "default")]
        audio_device: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available Launchpads.
    Pads {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { player_path } => {
            let launcher = config::init_launcher(&PathBuf::from(player_path))?;
            launcher.start()?;

            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down.");
            tokio::task::spawn_blocking(move || launcher.stop()).await?;
        }
        Commands::Catalog { media_path } => {
            let catalog = config::SoundCatalog::load_or_build(&PathBuf::from(&media_path))?;

            if catalog.sounds().is_empty() {
                println!("No sounds found in {}.", media_path);
                return Ok(());
            }

            println!("Sounds (count: {}):", catalog.sounds().len());
            for sound in catalog.sounds() {
                let looping = if sound.is_looping() { " (loop)" } else { "" };
                println!("- {}{}: {}", sound.id(), looping, sound.file_path());
                for cue in sound.cues() {
                    println!(
                        "    {} start={:?} fade_in={:?} fade_out={:?} pitch={}",
                        cue.name(),
                        cue.start(),
                        cue.fade_in(),
                        cue.fade_out(),
                        cue.pitch()
                    );
                }
            }
        }
        Commands::Play {
            media_path,
            cue_name,
            audio_device,
        } => {
            let dispatcher = Arc::new(CueDispatcher::new(audio::get_sink(&audio_device)?));
            dispatcher.load_or_build(&PathBuf::from(media_path))?;

            let playbacks =
                tokio::task::spawn_blocking(move || dispatcher.play_cue_and_wait(&cue_name))
                    .await?;
            if playbacks.is_empty() {
                println!("Nothing to play.");
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Pads {} => {
            let devices = pad::list_devices()?;

            if devices.is_empty() {
                println!("No pads found.");
                return Ok(());
            }

            println!("Pads:");
            for device in devices {
                println!("- {}", device);
            }
        }
    }

    Ok(())
}
