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
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use tracing::debug;

use super::capture::{to_output_depth, CaptureBuffer};
use super::resampler::{RateConverter, ResampleError};
use super::scheduler::PlaybackCursor;
use crate::chip::SynthCore;
use crate::events::EventStream;
use crate::timing::ChipTiming;

/// Native-rate frames the context can generate per render call.
pub const INTERNAL_BUFFER_FRAMES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Playback state readable from outside the render thread.
#[derive(Debug)]
pub struct PlaybackStatus {
    playing: AtomicBool,
    failed: AtomicBool,
    played: AtomicU32,
    total: u32,
}

impl PlaybackStatus {
    fn new(total: u32) -> PlaybackStatus {
        PlaybackStatus {
            playing: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            played: AtomicU32::new(0),
            total,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Asks the render loop to stop. The next render call outputs silence.
    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    /// True if rendering stopped because of an error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Native samples generated so far.
    pub fn played(&self) -> u32 {
        self.played.load(Ordering::Relaxed)
    }

    /// Native samples in the whole session.
    pub fn total(&self) -> u32 {
        self.total
    }

    fn start(&self) {
        self.playing.store(true, Ordering::Release);
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::Release);
        self.stop();
    }
}

/// Everything the render callback touches: the chip, the events driving it
/// and the buffers between it and the device.
pub struct AudioContext<C: SynthCore> {
    chip: C,
    timing: ChipTiming,
    events: EventStream,
    cursor: PlaybackCursor,
    played: u32,
    total: u32,
    status: Arc<PlaybackStatus>,
    resampler: Box<dyn RateConverter>,
    /// Interleaved native-rate frames at output depth.
    buffer: Vec<i16>,
    capture: Option<CaptureBuffer>,
    /// Silent frames still to feed the resampler once the budget is used up.
    flush_remaining: Option<usize>,
}

impl<C: SynthCore> AudioContext<C> {
    /// Creates a stopped context that will play `total_samples` native samples.
    /// The chip is reset. With `capture` set, every generated frame is kept.
    pub fn new(
        mut chip: C,
        timing: ChipTiming,
        events: EventStream,
        total_samples: u32,
        resampler: Box<dyn RateConverter>,
        capture: bool,
    ) -> AudioContext<C> {
        chip.reset();
        AudioContext {
            chip,
            timing,
            events,
            cursor: PlaybackCursor::new(),
            played: 0,
            total: total_samples,
            status: Arc::new(PlaybackStatus::new(total_samples)),
            resampler,
            buffer: vec![0; INTERNAL_BUFFER_FRAMES * 2],
            capture: capture.then(|| CaptureBuffer::with_capacity(total_samples as usize)),
            flush_remaining: None,
        }
    }

    pub fn start(&mut self) {
        self.status.start();
    }

    pub fn status(&self) -> Arc<PlaybackStatus> {
        self.status.clone()
    }

    pub fn played(&self) -> u32 {
        self.played
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn capture(&self) -> Option<&CaptureBuffer> {
        self.capture.as_ref()
    }

    /// Releases the capture buffer.
    pub fn into_capture(self) -> Option<CaptureBuffer> {
        self.capture
    }

    /// Fills `output` with interleaved stereo frames at the device rate.
    ///
    /// Generates as many native frames as the resampler needs, firing due
    /// events before each one. Once the sample budget is used up the chip is
    /// no longer clocked and the resampler is fed silence until its buffered
    /// frames have been delivered, then the context stops. On a resampler
    /// failure the output is silenced and the status is marked failed.
    pub fn render(&mut self, output: &mut [i16]) -> Result<(), RenderError> {
        if !self.status.is_playing() {
            output.fill(0);
            return Ok(());
        }

        let frame_count = output.len() / 2;
        let required = self
            .resampler
            .required_input_frames(frame_count)
            .min(INTERNAL_BUFFER_FRAMES);
        let cycles = self.timing.cycles_per_sample();

        for frame in 0..required {
            if self.played >= self.total {
                // Silence pushes the resampler's last real frames out before stopping.
                let remaining = self
                    .flush_remaining
                    .unwrap_or_else(|| self.resampler.flush_frames())
                    .saturating_sub(required - frame);
                self.flush_remaining = Some(remaining);
                self.buffer[frame * 2..required * 2].fill(0);
                if remaining == 0 {
                    self.status.stop();
                }
                break;
            }

            self.cursor
                .advance(&self.events, &mut self.chip, self.played);

            let mut sample = [0, 0];
            for _ in 0..cycles {
                sample = self.chip.clock();
            }

            self.buffer[frame * 2] = to_output_depth(sample[0]);
            self.buffer[frame * 2 + 1] = to_output_depth(sample[1]);
            if let Some(capture) = self.capture.as_mut() {
                capture.push(sample);
            }
            self.played += 1;
        }
        self.status.played.store(self.played, Ordering::Relaxed);

        match self.resampler.process(&self.buffer[..required * 2], output) {
            Ok(frames) => {
                let len = output.len();
                output[(frames * 2).min(len)..].fill(0);
                Ok(())
            }
            Err(e) => {
                output.fill(0);
                self.status.fail();
                Err(e.into())
            }
        }
    }

    /// Renders without a device until the budget runs out or playback is stopped.
    pub fn render_offline(&mut self, frames_per_call: usize) -> Result<(), RenderError> {
        let mut scratch = vec![0i16; frames_per_call.max(1) * 2];
        while self.status.is_playing() {
            self.render(&mut scratch)?;
        }

        debug!(played = self.played, total = self.total, "Offline render finished.");
        Ok(())
    }
}
