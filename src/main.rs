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
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use opmplay::analysis::SignalStats;
use opmplay::audio;
use opmplay::config::Config;
use opmplay::session::{CancelHandle, PlaybackReport, Session};
use opmplay::util::{duration_minutes_seconds, filename_display};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_WAV: &str = "opmplay_output.wav";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A timed register-event player for the YM2151."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compiles the demo sequence and writes both passes as JSON.
    Compile {
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The directory to write pass1.json and pass2.json to.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Plays the demo sequence through an audio device and captures it to a WAV file.
    Play {
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
        /// The WAV file to write the capture to.
        #[arg(default_value = DEFAULT_WAV)]
        wav: PathBuf,
    },
    /// Renders the demo sequence to a WAV file without an audio device.
    Render {
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The WAV file to write.
        #[arg(default_value = DEFAULT_WAV)]
        wav: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { config, output_dir } => {
            let config = Config::load(config.as_deref())?;
            let session = Session::new(&config.engine())?;
            let compiled = session.compile(&session.demo_score())?;
            compiled.export_events(&output_dir)?;

            println!(
                "Wrote {} pass-1 and {} pass-2 events to {}.",
                compiled.pass1.len(),
                compiled.pass2.len(),
                output_dir.display()
            );
        }
        Commands::Play {
            config,
            device,
            wav,
        } => {
            let config = Config::load(config.as_deref())?;
            let mut audio_config = config.audio();
            if let Some(device) = device {
                audio_config.set_device(&device);
            }

            let session = Session::new(&config.engine())?;
            let compiled = session.compile(&session.demo_score())?;
            let device = audio::get_device(&audio_config)?;

            println!(
                "Playing {} on {}.",
                duration_minutes_seconds(
                    session
                        .timing()
                        .samples_to_duration(compiled.total_samples)
                ),
                device
            );
            let report = session.play(
                &compiled,
                device.as_ref(),
                true,
                &CancelHandle::new(),
            )?;
            write_capture(&report, &wav);
        }
        Commands::Render { config, wav } => {
            let config = Config::load(config.as_deref())?;
            let session = Session::new(&config.engine())?;
            let compiled = session.compile(&session.demo_score())?;
            let report = session.render(&compiled, true)?;

            if let Some(capture) = &report.capture {
                println!("Signal: {}", SignalStats::from_interleaved(capture.frames()));
            }
            write_capture(&report, &wav);
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
    }

    Ok(())
}

/// Writes the capture from a finished session. Failures are logged; the
/// session itself has already completed.
fn write_capture(report: &PlaybackReport, path: &Path) {
    if report.handshake_violations > 0 {
        error!(
            violations = report.handshake_violations,
            "Bus handshake was violated during playback."
        );
    }

    let Some(capture) = &report.capture else {
        return;
    };
    match capture.write_wav(path, report.native_rate) {
        Ok(()) => {
            info!(file = filename_display(path), "Wrote capture.");
            println!(
                "Wrote {} frames at {} Hz to {}.",
                capture.position(),
                report.native_rate,
                path.display()
            );
        }
        Err(e) => error!(err = e.to_string(), "Unable to write capture."),
    }
}
