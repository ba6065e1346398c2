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

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::timing::{
    ChipTiming, DEFAULT_CLOCK_HZ, DEFAULT_CYCLES_PER_SAMPLE, DEFAULT_WRITE_DELAY_CYCLES,
};

const DEFAULT_BPM: u32 = 120;
const DEFAULT_TAIL: Duration = Duration::from_secs(1);

/// A YAML representation of the chip and sequence configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Engine {
    /// Chip master clock in Hz.
    clock_hz: Option<u32>,

    /// Master clock cycles per native sample.
    cycles_per_sample: Option<u32>,

    /// Cycles the bus must settle between address and data writes.
    write_delay_cycles: Option<u32>,

    /// Tempo of the demonstration sequence.
    bpm: Option<u32>,

    /// How long to keep rendering after the last register write, e.g. "1s" or "500ms".
    tail: Option<String>,
}

impl Engine {
    /// Returns the validated chip timing.
    pub fn timing(&self) -> Result<ChipTiming, ConfigError> {
        ChipTiming::new(
            self.clock_hz.unwrap_or(DEFAULT_CLOCK_HZ),
            self.cycles_per_sample.unwrap_or(DEFAULT_CYCLES_PER_SAMPLE),
            self.write_delay_cycles.unwrap_or(DEFAULT_WRITE_DELAY_CYCLES),
        )
    }

    /// Returns the tempo (default: 120).
    pub fn bpm(&self) -> Result<u32, ConfigError> {
        match self.bpm.unwrap_or(DEFAULT_BPM) {
            0 => Err(ConfigError::InvalidTiming(
                "bpm must be greater than 0".to_string(),
            )),
            bpm => Ok(bpm),
        }
    }

    /// Returns the tail duration (default: 1s).
    pub fn tail(&self) -> Result<Duration, ConfigError> {
        match &self.tail {
            Some(tail) => Ok(DurationString::from_string(tail.clone())
                .map_err(|e| ConfigError::InvalidDuration(tail.clone(), e.to_string()))?
                .into()),
            None => Ok(DEFAULT_TAIL),
        }
    }

    pub fn set_tail(&mut self, tail: &str) {
        self.tail = Some(tail.to_string());
    }
}
