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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::{
    audio::{ActiveStream, Device as AudioDevice, RenderHandler},
    config,
};

/// The name that selects the host's default output device.
const DEFAULT_DEVICE_NAME: &str = "default";

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The rate streams are opened at.
    sample_rate: u32,
    /// Fixed period size in frames, or the backend's default.
    buffer_size: Option<u32>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// A running cpal stream. The stream lives on its own thread because cpal
/// streams can't be moved between threads on every platform.
struct Stream {
    stop_tx: Option<crossbeam_channel::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl ActiveStream for Stream {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel wakes the stream thread, which drops the stream.
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("CPAL stream thread panicked");
            }
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least two output channels.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels >= 2 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        sample_rate: config::Audio::DEFAULT_SAMPLE_RATE,
                        buffer_size: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device. "default" selects the default host's default output.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let mut device = if name == DEFAULT_DEVICE_NAME {
            Device::default_output()?
        } else {
            match Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
            {
                Some(device) => device,
                None => return Err(format!("no device found with name {}", name).into()),
            }
        };

        device.sample_rate = config.sample_rate();
        device.buffer_size = config.buffer_size();
        Ok(device)
    }

    fn default_output() -> Result<Device, Box<dyn Error>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no default output device available")?;
        let max_channels = device
            .supported_output_configs()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);

        Ok(Device {
            name: device.name()?,
            max_channels,
            host_id: host.id(),
            device,
            sample_rate: config::Audio::DEFAULT_SAMPLE_RATE,
            buffer_size: None,
        })
    }
}

impl AudioDevice for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, mut handler: RenderHandler) -> Result<Box<dyn ActiveStream>, Box<dyn Error>> {
        let span = span!(Level::INFO, "start stream (cpal)");
        let _enter = span.enter();

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: match self.buffer_size {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let device = self.device.clone();
        let active = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let priority = callback_thread_priority();
        let rt_audio = rt_audio_enabled();

        let thread = {
            let active = active.clone();
            thread::spawn(move || {
                let mut priority_set = false;
                let error_active = active.clone();
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
                        handler(data);
                    },
                    move |err| {
                        error!(err = err.to_string(), "CPAL output stream error");
                        error_active.store(false, Ordering::Relaxed);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        active.store(false, Ordering::Relaxed);
                        let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    active.store(false, Ordering::Relaxed);
                    let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                active.store(false, Ordering::Relaxed);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = thread.join();
                return Err("CPAL stream thread exited before starting".into());
            }
        }

        info!(
            device = self.name,
            sample_rate = self.sample_rate,
            "CPAL output stream started"
        );
        Ok(Box::new(Stream {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            active,
        }))
    }
}
