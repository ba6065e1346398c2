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
//! A behavioural YM2151 (OPM) model.
//!
//! The model follows the chip's register map, key code pitch encoding, eight
//! operator algorithms with operator 1 feedback and the four stage envelope
//! generator. It is not cycle exact: one output sample is computed every
//! `cycles_per_sample` master clocks and the LFO, noise generator, timers and
//! detune registers are stored but not modelled.
//!
//! Bus timing is monitored. A data write that arrives without a latched
//! address, sooner than the settle time after its address write, or while the
//! chip is still busy with the previous write is counted as a handshake
//! violation and otherwise applied as written.

use std::f64::consts::TAU;

use super::{
    BusPort, StereoSample, SynthCore, CHANNELS, REG_AMS_D1R, REG_D1L_RR, REG_DT1_MUL,
    REG_DT2_D2R, REG_KEY_CODE, REG_KEY_FRACTION, REG_KEY_ON, REG_KS_AR, REG_PMS_AMS,
    REG_RL_FB_CONNECT, REG_TOTAL_LEVEL,
};
use crate::timing::{ChipTiming, DEFAULT_CLOCK_HZ};

const SLOTS: usize = 32;

/// Maximum envelope attenuation (silence), in 0.09375dB steps.
const MAX_ATTENUATION: u16 = 1023;
/// Envelope rate accumulator precision.
const ENVELOPE_FRACTION_BITS: u32 = 13;
/// Full-scale operator output feeding another operator's phase, in cycles.
const MODULATION_DEPTH: f64 = 4.0;
/// Native-precision amplitude of a single full-scale carrier.
const CARRIER_SCALE: f64 = 16384.0;
/// Output clamp. Halving this range lands exactly on 16 bits.
const OUTPUT_MIN: i32 = -65536;
const OUTPUT_MAX: i32 = 65535;

/// KC 0x4A (octave 4, note A) is 440Hz at the reference clock.
const A4_FREQUENCY: f64 = 440.0;
const A4_OCTAVE: i32 = 4;
const A4_SEMITONE: i32 = 8;

/// Returns the frequency in Hz of a key code/fraction pair at the given clock.
///
/// The note field skips every fourth code (3, 7, 11, 15), so twelve semitones
/// occupy codes 0-14 starting at C#.
pub fn key_code_frequency(key_code: u8, key_fraction: u8, clock_hz: u32) -> f64 {
    let octave = i32::from((key_code >> 4) & 0x07);
    let note = i32::from(key_code & 0x0F);
    let semitone = note - note / 4;
    let from_a4 = (octave - A4_OCTAVE) * 12 + (semitone - A4_SEMITONE);
    let fraction = f64::from(key_fraction & 0x3F) / 64.0;

    A4_FREQUENCY
        * 2f64.powf((f64::from(from_a4) + fraction) / 12.0)
        * (f64::from(clock_hz) / f64::from(DEFAULT_CLOCK_HZ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeStage {
    Attack,
    Decay1,
    Decay2,
    Release,
    Off,
}

#[derive(Debug, Clone, Copy)]
struct Operator {
    multiple: u8,
    total_level: u8,
    key_scale: u8,
    attack_rate: u8,
    decay1_rate: u8,
    decay1_level: u8,
    decay2_rate: u8,
    release_rate: u8,
    key_on: bool,
    phase: f64,
    stage: EnvelopeStage,
    attenuation: u16,
    rate_accumulator: u32,
}

impl Default for Operator {
    fn default() -> Self {
        Operator {
            multiple: 0,
            total_level: 0,
            key_scale: 0,
            attack_rate: 0,
            decay1_rate: 0,
            decay1_level: 0,
            decay2_rate: 0,
            release_rate: 0,
            key_on: false,
            phase: 0.0,
            stage: EnvelopeStage::Off,
            attenuation: MAX_ATTENUATION,
            rate_accumulator: 0,
        }
    }
}

impl Operator {
    fn set_key(&mut self, on: bool) {
        if on == self.key_on {
            return;
        }
        self.key_on = on;
        if on {
            self.phase = 0.0;
            self.stage = EnvelopeStage::Attack;
            self.rate_accumulator = 0;
        } else if self.stage != EnvelopeStage::Off {
            self.stage = EnvelopeStage::Release;
            self.rate_accumulator = 0;
        }
    }

    fn frequency_multiple(&self) -> f64 {
        match self.multiple {
            0 => 0.5,
            m => f64::from(m),
        }
    }

    /// Converts a 5-bit register rate to an effective 6-bit rate with key scaling applied.
    fn effective_rate(&self, rate: u8, key_code: u8) -> u8 {
        if rate == 0 {
            return 0;
        }
        let key_rate = (key_code >> 2) >> (3 - self.key_scale.min(3));
        (rate * 2 + key_rate).min(63)
    }

    fn decay1_target(&self) -> u16 {
        match self.decay1_level {
            15 => MAX_ATTENUATION,
            level => u16::from(level) << 5,
        }
    }

    /// Steps accumulated at the given effective rate for one sample.
    fn ticks(&mut self, rate: u8) -> u32 {
        if rate == 0 {
            return 0;
        }
        let step = (4 + u32::from(rate & 3)) << (rate >> 2);
        self.rate_accumulator += step;
        let ticks = self.rate_accumulator >> ENVELOPE_FRACTION_BITS;
        self.rate_accumulator &= (1 << ENVELOPE_FRACTION_BITS) - 1;
        ticks
    }

    fn step_envelope(&mut self, key_code: u8) {
        match self.stage {
            EnvelopeStage::Attack => {
                let rate = self.effective_rate(self.attack_rate, key_code);
                if rate >= 62 {
                    self.attenuation = 0;
                } else {
                    for _ in 0..self.ticks(rate) {
                        let decrement = (self.attenuation >> 4) + 1;
                        self.attenuation = self.attenuation.saturating_sub(decrement);
                    }
                }
                if self.attenuation == 0 {
                    self.stage = EnvelopeStage::Decay1;
                }
            }
            EnvelopeStage::Decay1 => {
                let rate = self.effective_rate(self.decay1_rate, key_code);
                self.decay(rate);
                if self.attenuation >= self.decay1_target() {
                    self.stage = EnvelopeStage::Decay2;
                }
            }
            EnvelopeStage::Decay2 => {
                let rate = self.effective_rate(self.decay2_rate, key_code);
                self.decay(rate);
            }
            EnvelopeStage::Release => {
                // The release rate register is 4 bits; the chip extends it to 5.
                let rate = self.effective_rate(self.release_rate * 2 + 1, key_code);
                self.decay(rate);
                if self.attenuation >= MAX_ATTENUATION {
                    self.stage = EnvelopeStage::Off;
                }
            }
            EnvelopeStage::Off => {}
        }
    }

    fn decay(&mut self, rate: u8) {
        let ticks = self.ticks(rate);
        let ticks = u16::try_from(ticks).unwrap_or(MAX_ATTENUATION);
        self.attenuation = self.attenuation.saturating_add(ticks).min(MAX_ATTENUATION);
    }

    /// Produces this sample's output in [-1, 1] and advances the phase.
    fn compute(&mut self, modulation: f64, increment: f64) -> f64 {
        if self.stage == EnvelopeStage::Off {
            return 0.0;
        }

        let attenuation = u32::from(self.attenuation) + (u32::from(self.total_level) << 3);
        let output = if attenuation >= u32::from(MAX_ATTENUATION) {
            0.0
        } else {
            let amplitude = 2f64.powf(-f64::from(attenuation) / 64.0);
            (TAU * (self.phase + modulation)).sin() * amplitude
        };

        self.phase = (self.phase + increment * self.frequency_multiple()).fract();
        output
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    key_code: u8,
    key_fraction: u8,
    outputs: u8,
    feedback: u8,
    connection: u8,
    /// Phase increment per native sample at multiple 1.
    increment: f64,
    /// The last two operator 1 outputs, oldest first.
    feedback_history: [f64; 2],
}

/// A YM2151 register model with bus handshake monitoring.
pub struct Ym2151 {
    timing: ChipTiming,
    registers: [u8; 256],
    channels: [Channel; CHANNELS as usize],
    operators: [Operator; SLOTS],
    latched_address: Option<u8>,
    address_cycle: u64,
    busy_until: u64,
    cycle: u64,
    sample_cycle: u32,
    output: StereoSample,
    handshake_violations: u64,
}

impl Ym2151 {
    /// Creates a chip running at the given timing, already reset.
    pub fn new(timing: ChipTiming) -> Ym2151 {
        let mut chip = Ym2151 {
            timing,
            registers: [0; 256],
            channels: [Channel::default(); CHANNELS as usize],
            operators: [Operator::default(); SLOTS],
            latched_address: None,
            address_cycle: 0,
            busy_until: 0,
            cycle: 0,
            sample_cycle: 0,
            output: [0, 0],
            handshake_violations: 0,
        };
        chip.reset();
        chip
    }

    /// The last value written to the given register.
    pub fn register(&self, address: u8) -> u8 {
        self.registers[usize::from(address)]
    }

    /// Returns true while the chip is still absorbing the previous data write.
    pub fn is_busy(&self) -> bool {
        self.cycle < self.busy_until
    }

    /// Number of bus writes that did not respect the address/data handshake.
    pub fn handshake_violations(&self) -> u64 {
        self.handshake_violations
    }

    /// Master clock cycles elapsed since reset.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// The frequency in Hz currently programmed on a channel.
    pub fn channel_frequency(&self, channel: u8) -> f64 {
        let channel = &self.channels[usize::from(channel % CHANNELS)];
        key_code_frequency(channel.key_code, channel.key_fraction, self.timing.clock_hz())
    }

    fn native_rate(&self) -> f64 {
        f64::from(self.timing.clock_hz()) / f64::from(self.timing.cycles_per_sample())
    }

    fn apply(&mut self, address: u8, value: u8) {
        self.registers[usize::from(address)] = value;

        match address {
            REG_KEY_ON => {
                let channel = value & 0x07;
                // Key-on bits 3-6 are M1, C1, M2, C2 while slots are laid out M1, M2, C1, C2.
                for (bit, operator) in [(3, 0u8), (4, 2), (5, 1), (6, 3)] {
                    let on = value & (1 << bit) != 0;
                    self.operators[usize::from(super::slot(channel, operator))].set_key(on);
                }
            }
            a if (REG_RL_FB_CONNECT..REG_KEY_CODE).contains(&a) => {
                let channel = &mut self.channels[usize::from(a - REG_RL_FB_CONNECT)];
                channel.outputs = value >> 6;
                channel.feedback = (value >> 3) & 0x07;
                channel.connection = value & 0x07;
            }
            a if (REG_KEY_CODE..REG_KEY_FRACTION).contains(&a) => {
                let index = usize::from(a - REG_KEY_CODE);
                self.channels[index].key_code = value & 0x7F;
                self.update_increment(index);
            }
            a if (REG_KEY_FRACTION..REG_PMS_AMS).contains(&a) => {
                let index = usize::from(a - REG_KEY_FRACTION);
                self.channels[index].key_fraction = value >> 2;
                self.update_increment(index);
            }
            a if (REG_DT1_MUL..REG_TOTAL_LEVEL).contains(&a) => {
                self.operators[usize::from(a - REG_DT1_MUL)].multiple = value & 0x0F;
            }
            a if (REG_TOTAL_LEVEL..REG_KS_AR).contains(&a) => {
                self.operators[usize::from(a - REG_TOTAL_LEVEL)].total_level = value & 0x7F;
            }
            a if (REG_KS_AR..REG_AMS_D1R).contains(&a) => {
                let operator = &mut self.operators[usize::from(a - REG_KS_AR)];
                operator.key_scale = value >> 6;
                operator.attack_rate = value & 0x1F;
            }
            a if (REG_AMS_D1R..REG_DT2_D2R).contains(&a) => {
                self.operators[usize::from(a - REG_AMS_D1R)].decay1_rate = value & 0x1F;
            }
            a if (REG_DT2_D2R..REG_D1L_RR).contains(&a) => {
                self.operators[usize::from(a - REG_DT2_D2R)].decay2_rate = value & 0x1F;
            }
            a if a >= REG_D1L_RR => {
                let operator = &mut self.operators[usize::from(a - REG_D1L_RR)];
                operator.decay1_level = value >> 4;
                operator.release_rate = value & 0x0F;
            }
            // PMS/AMS, LFO, noise and timer registers are kept in the register file only.
            _ => {}
        }
    }

    fn update_increment(&mut self, index: usize) {
        let native_rate = self.native_rate();
        let channel = &mut self.channels[index];
        channel.increment = key_code_frequency(
            channel.key_code,
            channel.key_fraction,
            self.timing.clock_hz(),
        ) / native_rate;
    }

    /// Runs the operator network of one channel for one sample.
    fn compute_channel(&mut self, index: usize) -> f64 {
        let channel = self.channels[index];
        let base = index;
        let (m1, m2, c1, c2) = (base, base + 8, base + 16, base + 24);

        for slot in [m1, m2, c1, c2] {
            self.operators[slot].step_envelope(channel.key_code);
        }

        let feedback = if channel.feedback == 0 {
            0.0
        } else {
            (channel.feedback_history[0] + channel.feedback_history[1])
                * 2f64.powi(i32::from(channel.feedback) - 7)
        };

        let increment = channel.increment;
        let ops = &mut self.operators;
        let m1_out = ops[m1].compute(feedback, increment);
        self.channels[index].feedback_history = [channel.feedback_history[1], m1_out];

        let d = MODULATION_DEPTH;
        match channel.connection {
            0 => {
                let c1_out = ops[c1].compute(m1_out * d, increment);
                let m2_out = ops[m2].compute(c1_out * d, increment);
                ops[c2].compute(m2_out * d, increment)
            }
            1 => {
                let c1_out = ops[c1].compute(0.0, increment);
                let m2_out = ops[m2].compute((m1_out + c1_out) * d, increment);
                ops[c2].compute(m2_out * d, increment)
            }
            2 => {
                let c1_out = ops[c1].compute(0.0, increment);
                let m2_out = ops[m2].compute(c1_out * d, increment);
                ops[c2].compute((m1_out + m2_out) * d, increment)
            }
            3 => {
                let c1_out = ops[c1].compute(m1_out * d, increment);
                let m2_out = ops[m2].compute(0.0, increment);
                ops[c2].compute((c1_out + m2_out) * d, increment)
            }
            4 => {
                let c1_out = ops[c1].compute(m1_out * d, increment);
                let m2_out = ops[m2].compute(0.0, increment);
                c1_out + ops[c2].compute(m2_out * d, increment)
            }
            5 => {
                let c1_out = ops[c1].compute(m1_out * d, increment);
                let m2_out = ops[m2].compute(m1_out * d, increment);
                c1_out + m2_out + ops[c2].compute(m1_out * d, increment)
            }
            6 => {
                let c1_out = ops[c1].compute(m1_out * d, increment);
                let m2_out = ops[m2].compute(0.0, increment);
                c1_out + m2_out + ops[c2].compute(0.0, increment)
            }
            _ => {
                let c1_out = ops[c1].compute(0.0, increment);
                let m2_out = ops[m2].compute(0.0, increment);
                m1_out + c1_out + m2_out + ops[c2].compute(0.0, increment)
            }
        }
    }

    fn generate_sample(&mut self) -> StereoSample {
        let mut left = 0.0;
        let mut right = 0.0;
        for index in 0..usize::from(CHANNELS) {
            let out = self.compute_channel(index) * CARRIER_SCALE;
            let outputs = self.channels[index].outputs;
            if outputs & 0x01 != 0 {
                left += out;
            }
            if outputs & 0x02 != 0 {
                right += out;
            }
        }

        [
            (left as i32).clamp(OUTPUT_MIN, OUTPUT_MAX),
            (right as i32).clamp(OUTPUT_MIN, OUTPUT_MAX),
        ]
    }
}

impl Default for Ym2151 {
    fn default() -> Self {
        Ym2151::new(ChipTiming::default())
    }
}

impl SynthCore for Ym2151 {
    fn reset(&mut self) {
        self.registers = [0; 256];
        self.channels = [Channel::default(); CHANNELS as usize];
        self.operators = [Operator::default(); SLOTS];
        self.latched_address = None;
        self.address_cycle = 0;
        self.busy_until = 0;
        self.cycle = 0;
        self.sample_cycle = 0;
        self.output = [0, 0];
        self.handshake_violations = 0;
        for index in 0..usize::from(CHANNELS) {
            self.update_increment(index);
        }
    }

    fn write(&mut self, port: BusPort, value: u8) {
        match port {
            BusPort::Address => {
                if self.is_busy() {
                    self.handshake_violations += 1;
                }
                self.latched_address = Some(value);
                self.address_cycle = self.cycle;
            }
            BusPort::Data => {
                let settle = u64::from(self.timing.write_delay_cycles());
                match self.latched_address {
                    Some(address) => {
                        if self.is_busy() || self.cycle - self.address_cycle < settle {
                            self.handshake_violations += 1;
                        }
                        self.apply(address, value);
                    }
                    None => self.handshake_violations += 1,
                }
                self.busy_until = self.cycle + settle;
            }
        }
    }

    fn clock(&mut self) -> StereoSample {
        self.cycle += 1;
        self.sample_cycle += 1;
        if self.sample_cycle >= self.timing.cycles_per_sample() {
            self.sample_cycle = 0;
            self.output = self.generate_sample();
        }
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{slot, KEY_ON_ALL_OPERATORS};

    /// Writes a register respecting the handshake, clocking through the settle time.
    fn write_register(chip: &mut Ym2151, address: u8, data: u8) {
        chip.write(BusPort::Address, address);
        for _ in 0..128 {
            chip.clock();
        }
        chip.write(BusPort::Data, data);
        for _ in 0..128 {
            chip.clock();
        }
    }

    fn render(chip: &mut Ym2151, samples: usize) -> Vec<i32> {
        let mut left = Vec::with_capacity(samples);
        for _ in 0..samples {
            let mut out = [0, 0];
            for _ in 0..64 {
                out = chip.clock();
            }
            left.push(out[0]);
        }
        left
    }

    fn configure_tone(chip: &mut Ym2151, key_code: u8) {
        write_register(chip, REG_RL_FB_CONNECT, 0xC7);
        write_register(chip, REG_KEY_CODE, key_code);
        write_register(chip, REG_KEY_FRACTION, 0x00);
        for operator in 0..4 {
            let slot = slot(0, operator);
            write_register(chip, REG_DT1_MUL + slot, 0x01);
            write_register(
                chip,
                REG_TOTAL_LEVEL + slot,
                if operator == 0 { 0x00 } else { 0x7F },
            );
            write_register(chip, REG_KS_AR + slot, 0x1F);
            write_register(chip, REG_AMS_D1R + slot, 0x05);
            write_register(chip, REG_DT2_D2R + slot, 0x05);
            write_register(chip, REG_D1L_RR + slot, 0xF7);
        }
    }

    #[test]
    fn test_key_code_frequency() {
        assert!((key_code_frequency(0x4A, 0, DEFAULT_CLOCK_HZ) - 440.0).abs() < 1e-9);
        // C4 is the last note code of octave 3.
        assert!((key_code_frequency(0x3E, 0, DEFAULT_CLOCK_HZ) - 261.6256).abs() < 0.01);
        // One octave up doubles the frequency.
        assert!((key_code_frequency(0x5A, 0, DEFAULT_CLOCK_HZ) - 880.0).abs() < 1e-9);
        // The largest key fraction is one 64th short of the next semitone.
        let a_sharp = key_code_frequency(0x4C, 0, DEFAULT_CLOCK_HZ);
        let a_plus = key_code_frequency(0x4A, 63, DEFAULT_CLOCK_HZ);
        assert!((a_sharp / a_plus - 2f64.powf(1.0 / 12.0 / 64.0)).abs() < 1e-9);
        // A faster clock raises the pitch proportionally.
        let scaled = 440.0 * 4_000_000.0 / 3_579_545.0;
        assert!((key_code_frequency(0x4A, 0, 4_000_000) - scaled).abs() < 1e-9);
    }

    #[test]
    fn test_silent_after_reset() {
        let mut chip = Ym2151::default();
        assert!(render(&mut chip, 100).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_register_file() {
        let mut chip = Ym2151::default();
        write_register(&mut chip, REG_KEY_CODE, 0x4A);
        assert_eq!(chip.register(REG_KEY_CODE), 0x4A);
        assert!((chip.channel_frequency(0) - 440.0).abs() < 1e-9);
        assert_eq!(chip.handshake_violations(), 0);
    }

    #[test]
    fn test_key_on_produces_sound() {
        let mut chip = Ym2151::default();
        configure_tone(&mut chip, 0x4A);
        write_register(&mut chip, REG_KEY_ON, KEY_ON_ALL_OPERATORS);

        let samples = render(&mut chip, 2000);
        let max = samples.iter().map(|s| s.abs()).max().unwrap();
        assert!(max > 10000, "expected a loud tone, got max {}", max);
        assert!(max <= 65536);
        assert_eq!(chip.handshake_violations(), 0);
    }

    #[test]
    fn test_key_off_releases() {
        let mut chip = Ym2151::default();
        configure_tone(&mut chip, 0x4A);
        write_register(&mut chip, REG_KEY_ON, KEY_ON_ALL_OPERATORS);
        render(&mut chip, 1000);
        write_register(&mut chip, REG_KEY_ON, 0x00);

        // Release rate 7 fades out well within a second.
        render(&mut chip, 55930);
        assert!(render(&mut chip, 1000).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_pan_disables_output() {
        let mut chip = Ym2151::default();
        configure_tone(&mut chip, 0x4A);
        // Right only.
        write_register(&mut chip, REG_RL_FB_CONNECT, 0x87);
        write_register(&mut chip, REG_KEY_ON, KEY_ON_ALL_OPERATORS);
        assert!(render(&mut chip, 500).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_handshake_violations() {
        let mut chip = Ym2151::default();

        // Data without an address.
        chip.write(BusPort::Data, 0x00);
        assert_eq!(chip.handshake_violations(), 1);

        for _ in 0..256 {
            chip.clock();
        }

        // Data too soon after the address.
        chip.write(BusPort::Address, REG_KEY_CODE);
        for _ in 0..10 {
            chip.clock();
        }
        chip.write(BusPort::Data, 0x4A);
        assert_eq!(chip.handshake_violations(), 2);
        assert!(chip.is_busy());

        // Address while busy.
        chip.write(BusPort::Address, REG_KEY_FRACTION);
        assert_eq!(chip.handshake_violations(), 3);

        chip.reset();
        assert_eq!(chip.handshake_violations(), 0);
        assert_eq!(chip.cycles(), 0);
    }
}
