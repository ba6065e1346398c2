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
use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::info;

use super::context::INTERNAL_BUFFER_FRAMES;

const CHANNELS: usize = 2;

/// Output frames produced per resampler pass.
const CHUNK_FRAMES: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error("unable to resample from {0}Hz to {1}Hz: {2}")]
    Construction(u32, u32, rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Converts interleaved stereo `i16` audio from the native rate to the device rate.
pub trait RateConverter: Send {
    /// Input frames to supply to the next `process` call so it can fill
    /// `output_frames` frames.
    fn required_input_frames(&self, output_frames: usize) -> usize;

    /// Consumes all of `input` and writes as many frames as are available into
    /// `output`, up to its length. Returns the number of frames written.
    fn process(&mut self, input: &[i16], output: &mut [i16]) -> Result<usize, ResampleError>;

    /// Frames of silent input needed after the last real frame before every
    /// real frame has come back out of `process`.
    fn flush_frames(&self) -> usize {
        0
    }
}

/// Returns a converter between the two rates. Equal rates copy samples through untouched.
pub fn for_rates(
    native_rate: u32,
    device_rate: u32,
) -> Result<Box<dyn RateConverter>, ResampleError> {
    if native_rate == device_rate {
        return Ok(Box::new(Passthrough));
    }

    info!(
        from = native_rate,
        to = device_rate,
        "Resampling native output for the device."
    );
    Ok(Box::new(SincConverter::new(native_rate, device_rate)?))
}

/// Used when the device runs at the native rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl RateConverter for Passthrough {
    fn required_input_frames(&self, output_frames: usize) -> usize {
        output_frames
    }

    fn process(&mut self, input: &[i16], output: &mut [i16]) -> Result<usize, ResampleError> {
        let samples = input.len().min(output.len()) / CHANNELS * CHANNELS;
        output[..samples].copy_from_slice(&input[..samples]);
        Ok(samples / CHANNELS)
    }
}

/// A band-limited sinc resampler.
///
/// Input is accumulated in a planar sliding window and converted in fixed
/// output chunks. Converted frames wait in a planar FIFO until the device asks
/// for them. All buffers are sized up front for a full internal buffer's worth
/// of audio.
pub struct SincConverter {
    resampler: SincFixedOut<f32>,
    /// Device frames per native frame.
    ratio: f64,
    /// Planar input not yet consumed by the resampler.
    input: Vec<Vec<f32>>,
    /// Planar output waiting to be handed to the device.
    fifo: Vec<Vec<f32>>,
    scratch: Vec<Vec<f32>>,
}

impl SincConverter {
    pub fn new(native_rate: u32, device_rate: u32) -> Result<SincConverter, ResampleError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = f64::from(device_rate) / f64::from(native_rate);

        let resampler = SincFixedOut::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, CHANNELS)
            .map_err(|e| ResampleError::Construction(native_rate, device_rate, e))?;

        let input_capacity = INTERNAL_BUFFER_FRAMES + resampler.input_frames_max() * 2;
        let fifo_capacity = INTERNAL_BUFFER_FRAMES + resampler.output_frames_max() * 2;
        let scratch = resampler.output_buffer_allocate(true);

        Ok(SincConverter {
            resampler,
            ratio,
            input: vec![Vec::with_capacity(input_capacity); CHANNELS],
            fifo: vec![Vec::with_capacity(fifo_capacity); CHANNELS],
            scratch,
        })
    }

    fn pending_input(&self) -> usize {
        self.input[0].len()
    }

    fn available_output(&self) -> usize {
        self.fifo[0].len()
    }
}

impl RateConverter for SincConverter {
    fn required_input_frames(&self, output_frames: usize) -> usize {
        let missing = output_frames.saturating_sub(self.available_output());
        if missing == 0 {
            return 0;
        }

        // The per-chunk input requirement drifts as the fractional position
        // advances. Spare frames stay queued for the next call.
        let chunks = missing.div_ceil(CHUNK_FRAMES);
        (chunks * (self.resampler.input_frames_next() + 2)).saturating_sub(self.pending_input())
    }

    fn process(&mut self, input: &[i16], output: &mut [i16]) -> Result<usize, ResampleError> {
        for frame in input.chunks_exact(CHANNELS) {
            for (channel, sample) in self.input.iter_mut().zip(frame) {
                channel.push(f32::from(*sample) / 32768.0);
            }
        }

        let wanted = output.len() / CHANNELS;
        while self.available_output() < wanted
            && self.pending_input() >= self.resampler.input_frames_next()
        {
            let (consumed, produced) =
                self.resampler
                    .process_into_buffer(&self.input[..], &mut self.scratch[..], None)?;

            for pending in self.input.iter_mut() {
                pending.drain(..consumed);
            }
            for (fifo, converted) in self.fifo.iter_mut().zip(&self.scratch) {
                fifo.extend_from_slice(&converted[..produced]);
            }
        }

        let frames = wanted.min(self.available_output());
        for (i, frame) in output.chunks_exact_mut(CHANNELS).take(frames).enumerate() {
            for (sample, fifo) in frame.iter_mut().zip(&self.fifo) {
                *sample = (fifo[i] * 32768.0) as i16;
            }
        }
        for fifo in self.fifo.iter_mut() {
            fifo.drain(..frames);
        }

        Ok(frames)
    }

    fn flush_frames(&self) -> usize {
        // Everything queued or still inside the filter, plus two chunks of slack
        // so the final call converts past the last real frame.
        let output = self.resampler.output_delay() + self.available_output() + 2 * CHUNK_FRAMES;
        self.pending_input() + (output as f64 / self.ratio).ceil() as usize
    }
}
