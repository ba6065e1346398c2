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
use std::fmt;

pub mod mock;
pub mod ym2151;

pub use ym2151::Ym2151;

/// One stereo sample at the chip's native precision, left then right.
pub type StereoSample = [i32; 2];

/// Number of FM channels on the chip.
pub const CHANNELS: u8 = 8;
/// Number of operators per channel.
pub const OPERATORS: u8 = 4;

/// Key on/off. Bits 0-2 select the channel, bits 3-6 the operators to key on.
pub const REG_KEY_ON: u8 = 0x08;
/// Output enables (RL), operator-1 feedback (FB) and algorithm (CONNECT), per channel.
pub const REG_RL_FB_CONNECT: u8 = 0x20;
/// Key code (octave and note), per channel.
pub const REG_KEY_CODE: u8 = 0x28;
/// Key fraction, per channel.
pub const REG_KEY_FRACTION: u8 = 0x30;
/// Phase and amplitude modulation sensitivity, per channel.
pub const REG_PMS_AMS: u8 = 0x38;
/// Detune 1 and frequency multiplier, per slot.
pub const REG_DT1_MUL: u8 = 0x40;
/// Total level, per slot.
pub const REG_TOTAL_LEVEL: u8 = 0x60;
/// Key scaling and attack rate, per slot.
pub const REG_KS_AR: u8 = 0x80;
/// Amplitude modulation enable and first decay rate, per slot.
pub const REG_AMS_D1R: u8 = 0xA0;
/// Detune 2 and second decay rate, per slot.
pub const REG_DT2_D2R: u8 = 0xC0;
/// First decay level and release rate, per slot.
pub const REG_D1L_RR: u8 = 0xE0;

/// Key-on data that triggers all four operators of a channel.
pub const KEY_ON_ALL_OPERATORS: u8 = 0x78;

/// Returns the register offset of an operator slot. Slots are laid out
/// operator-major: M1 at 0-7, M2 at 8-15, C1 at 16-23, C2 at 24-31.
pub fn slot(channel: u8, operator: u8) -> u8 {
    channel + operator * CHANNELS
}

/// The two bus ports of the chip's register interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusPort {
    /// Selects the register the next data write targets.
    Address,
    /// Writes a byte to the selected register.
    Data,
}

impl fmt::Display for BusPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusPort::Address => write!(f, "address"),
            BusPort::Data => write!(f, "data"),
        }
    }
}

/// A cycle-stepped sound chip driven through an address/data bus.
pub trait SynthCore: Send {
    /// Returns the chip to its power-on state.
    fn reset(&mut self);

    /// Issues a single bus write. Consumes no clock cycles.
    fn write(&mut self, port: BusPort, value: u8);

    /// Advances the chip by one master clock cycle and returns the stereo
    /// output currently presented by the chip.
    fn clock(&mut self) -> StereoSample;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_layout() {
        assert_eq!(slot(0, 0), 0);
        assert_eq!(slot(0, 1), 8);
        assert_eq!(slot(0, 3), 24);
        assert_eq!(slot(7, 3), 31);
    }
}
