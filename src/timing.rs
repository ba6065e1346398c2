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

use crate::config::ConfigError;

/// The YM2151 master clock on most boards (NTSC colorburst).
pub const DEFAULT_CLOCK_HZ: u32 = 3_579_545;
/// The chip emits one stereo sample every 64 master clock cycles.
pub const DEFAULT_CYCLES_PER_SAMPLE: u32 = 64;
/// Minimum time the bus must hold a value between the address and data phases.
pub const DEFAULT_WRITE_DELAY_CYCLES: u32 = 128;

/// Clock relationships between the synthesizer core and the sample timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipTiming {
    clock_hz: u32,
    cycles_per_sample: u32,
    write_delay_cycles: u32,
}

impl ChipTiming {
    /// Creates a new timing description, rejecting values that can't produce a sample clock.
    pub fn new(
        clock_hz: u32,
        cycles_per_sample: u32,
        write_delay_cycles: u32,
    ) -> Result<ChipTiming, ConfigError> {
        if cycles_per_sample == 0 {
            return Err(ConfigError::InvalidTiming(
                "cycles per sample must be greater than 0".to_string(),
            ));
        }
        if clock_hz < cycles_per_sample {
            return Err(ConfigError::InvalidTiming(format!(
                "clock of {}Hz is too slow for {} cycles per sample",
                clock_hz, cycles_per_sample
            )));
        }

        Ok(ChipTiming {
            clock_hz,
            cycles_per_sample,
            write_delay_cycles,
        })
    }

    /// The chip's master clock in Hz.
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Master clock cycles per native sample.
    pub fn cycles_per_sample(&self) -> u32 {
        self.cycles_per_sample
    }

    /// Bus settle time in master clock cycles.
    pub fn write_delay_cycles(&self) -> u32 {
        self.write_delay_cycles
    }

    /// The native sample rate implied by the clock (3579545 / 64 = 55930Hz by default).
    pub fn native_rate(&self) -> u32 {
        self.clock_hz / self.cycles_per_sample
    }

    /// The settle delay expressed in native samples. Rounds up so that the
    /// delay is never shorter than the bus requires.
    pub fn settle_delay_samples(&self) -> u32 {
        self.write_delay_cycles.div_ceil(self.cycles_per_sample)
    }

    /// Converts a duration to a native sample count, truncating any partial sample.
    pub fn duration_to_samples(&self, duration: Duration) -> u32 {
        (duration.as_secs_f64() * f64::from(self.native_rate())) as u32
    }

    /// Converts a native sample count back to a duration.
    pub fn samples_to_duration(&self, samples: u32) -> Duration {
        Duration::from_secs_f64(f64::from(samples) / f64::from(self.native_rate()))
    }

    /// Native samples in one quarter note at the given tempo.
    pub fn quarter_note_samples(&self, bpm: u32) -> u32 {
        self.duration_to_samples(Duration::from_secs_f64(60.0 / f64::from(bpm.max(1))))
    }
}

impl Default for ChipTiming {
    fn default() -> Self {
        ChipTiming {
            clock_hz: DEFAULT_CLOCK_HZ,
            cycles_per_sample: DEFAULT_CYCLES_PER_SAMPLE,
            write_delay_cycles: DEFAULT_WRITE_DELAY_CYCLES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = ChipTiming::default();
        assert_eq!(timing.native_rate(), 55930);
        assert_eq!(timing.settle_delay_samples(), 2);
    }

    #[test]
    fn test_settle_delay_rounds_up() {
        let timing = ChipTiming::new(DEFAULT_CLOCK_HZ, 64, 130).unwrap();
        assert_eq!(timing.settle_delay_samples(), 3);

        let timing = ChipTiming::new(DEFAULT_CLOCK_HZ, 64, 10).unwrap();
        assert_eq!(timing.settle_delay_samples(), 1);
    }

    #[test]
    fn test_invalid_timing() {
        assert!(ChipTiming::new(DEFAULT_CLOCK_HZ, 0, 128).is_err());
        assert!(ChipTiming::new(10, 64, 128).is_err());
    }

    #[test]
    fn test_quarter_note_samples() {
        let timing = ChipTiming::default();
        // 0.5 seconds at 55930Hz.
        assert_eq!(timing.quarter_note_samples(120), 27965);
        assert_eq!(timing.quarter_note_samples(60), 55930);
    }

    #[test]
    fn test_duration_round_trip() {
        let timing = ChipTiming::default();
        let samples = timing.duration_to_samples(Duration::from_secs(2));
        assert_eq!(samples, 111860);
        assert_eq!(timing.samples_to_duration(samples), Duration::from_secs(2));
    }
}
