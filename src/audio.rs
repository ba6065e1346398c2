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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mock;
pub mod thread_priority;

/// Fills an interleaved stereo `i16` buffer. Called from the device's audio
/// thread, so it must never block.
pub type RenderHandler = Box<dyn FnMut(&mut [i16]) + Send>;

/// An output stream that keeps pulling from its handler until dropped.
pub trait ActiveStream: Send {
    /// False once the stream has stopped on its own, for example after a device error.
    fn is_active(&self) -> bool;
}

pub trait Device: fmt::Display + Send + Sync {
    /// The rate the device will be opened at.
    fn sample_rate(&self) -> u32;

    /// Opens a two channel 16-bit stream that pulls audio from the handler.
    fn start(&self, handler: RenderHandler) -> Result<Box<dyn ActiveStream>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named in the configuration. Names starting with "mock" select a mock device.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
