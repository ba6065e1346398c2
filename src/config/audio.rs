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
use serde::Deserialize;

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Audio {
    /// The audio device. "default" picks the host's default output.
    device: String,

    /// Device sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Stream period size in frames. The backend picks one when unset.
    buffer_size: Option<u32>,
}

impl Audio {
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            buffer_size: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the device sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(Self::DEFAULT_SAMPLE_RATE)
    }

    /// Returns the stream period size, if fixed.
    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    pub fn set_device(&mut self, device: &str) {
        self.device = device.to_string();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = Some(sample_rate);
    }

    pub fn set_buffer_size(&mut self, frames: u32) {
        self.buffer_size = Some(frames);
    }
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new("default")
    }
}
