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
use super::{BusPort, StereoSample, SynthCore};

/// A bus write observed by the recording chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Clock cycles elapsed before the write.
    pub cycle: u64,
    pub port: BusPort,
    pub value: u8,
}

/// A chip that records every bus write and emits a predictable ramp.
///
/// The k-th clock since reset returns `[k, -k]` unless a fixed output has been set.
#[derive(Debug, Default)]
pub struct RecordingChip {
    writes: Vec<RecordedWrite>,
    cycle: u64,
    fixed_output: Option<StereoSample>,
    resets: usize,
}

impl RecordingChip {
    pub fn new() -> RecordingChip {
        RecordingChip::default()
    }

    /// Creates a chip that always outputs the given sample.
    pub fn with_output(output: StereoSample) -> RecordingChip {
        RecordingChip {
            fixed_output: Some(output),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Data bytes written right after an address write of the given register.
    pub fn data_written_to(&self, address: u8) -> Vec<u8> {
        self.writes
            .windows(2)
            .filter(|pair| {
                pair[0].port == BusPort::Address
                    && pair[0].value == address
                    && pair[1].port == BusPort::Data
            })
            .map(|pair| pair[1].value)
            .collect()
    }
}

impl SynthCore for RecordingChip {
    fn reset(&mut self) {
        self.writes.clear();
        self.cycle = 0;
        self.resets += 1;
    }

    fn write(&mut self, port: BusPort, value: u8) {
        self.writes.push(RecordedWrite {
            cycle: self.cycle,
            port,
            value,
        });
    }

    fn clock(&mut self) -> StereoSample {
        self.cycle += 1;
        match self.fixed_output {
            Some(output) => output,
            None => {
                let k = i32::try_from(self.cycle).unwrap_or(i32::MAX);
                [k, -k]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes() {
        let mut chip = RecordingChip::new();
        chip.write(BusPort::Address, 0x28);
        assert_eq!(chip.clock(), [1, -1]);
        chip.write(BusPort::Data, 0x4A);
        assert_eq!(chip.clock(), [2, -2]);

        assert_eq!(
            chip.writes(),
            &[
                RecordedWrite {
                    cycle: 0,
                    port: BusPort::Address,
                    value: 0x28
                },
                RecordedWrite {
                    cycle: 1,
                    port: BusPort::Data,
                    value: 0x4A
                },
            ]
        );
        assert_eq!(chip.data_written_to(0x28), vec![0x4A]);

        chip.reset();
        assert!(chip.writes().is_empty());
        assert_eq!(chip.cycles(), 0);
        assert_eq!(chip.resets(), 1);
    }

    #[test]
    fn test_fixed_output() {
        let mut chip = RecordingChip::with_output([70000, -70000]);
        assert_eq!(chip.clock(), [70000, -70000]);
        assert_eq!(chip.clock(), [70000, -70000]);
    }
}
