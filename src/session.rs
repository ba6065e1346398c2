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
use std::{fs, path::Path, sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, span, Level};

use crate::audio::{Device, RenderHandler};
use crate::chip::Ym2151;
use crate::compiler::{compile_pass1, compile_pass2, CompileError, Score};
use crate::config::{ConfigError, Engine};
use crate::events::{EventExportError, EventStream};
use crate::playback::{
    resampler, AudioContext, CaptureBuffer, Passthrough, RenderError, ResampleError,
};
use crate::timing::ChipTiming;
use crate::util::duration_minutes_seconds;

/// How often the controlling thread checks on a live session.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Frames generated per call when rendering without a device.
const OFFLINE_FRAMES_PER_CALL: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("rendering failed during playback")]
    Render,

    #[error(transparent)]
    Offline(#[from] RenderError),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error("the playback context is still shared with the audio stream")]
    ContextStillShared,
}

/// Lets another thread stop a session that is playing.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<Mutex<bool>>,
    condvar: Arc<Condvar>,
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Stops the session. The next device callback outputs silence.
    pub fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.condvar.notify_all();
    }

    /// Waits up to `timeout` for a cancel. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if !*cancelled {
            let _ = self.condvar.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }
}

/// Both compiler passes for one score and the number of samples to render.
#[derive(Debug, Clone)]
pub struct CompiledSequence {
    pub pass1: EventStream,
    pub pass2: EventStream,
    pub total_samples: u32,
}

impl CompiledSequence {
    /// Writes pass1.json and pass2.json into the given directory, creating it if needed.
    pub fn export_events(&self, dir: &Path) -> Result<(), EventExportError> {
        fs::create_dir_all(dir)?;
        self.pass1.write_json(&dir.join("pass1.json"))?;
        self.pass2.write_json(&dir.join("pass2.json"))?;
        Ok(())
    }
}

/// The outcome of a finished session.
#[derive(Debug)]
pub struct PlaybackReport {
    pub played: u32,
    pub total: u32,
    pub native_rate: u32,
    pub handshake_violations: u64,
    /// True if the session was stopped before the budget ran out.
    pub cancelled: bool,
    pub capture: Option<CaptureBuffer>,
}

/// Compiles scores and plays them through a YM2151.
pub struct Session {
    timing: ChipTiming,
    bpm: u32,
    tail: Duration,
}

impl Session {
    pub fn new(engine: &Engine) -> Result<Session, ConfigError> {
        Ok(Session {
            timing: engine.timing()?,
            bpm: engine.bpm()?,
            tail: engine.tail()?,
        })
    }

    pub fn timing(&self) -> &ChipTiming {
        &self.timing
    }

    /// The four note demonstration sequence at the configured tempo.
    pub fn demo_score(&self) -> Score {
        Score::demo(&self.timing, self.bpm)
    }

    /// Runs both compiler passes. Playback lasts until the tail has elapsed
    /// after the last bus event.
    pub fn compile(&self, score: &Score) -> Result<CompiledSequence, CompileError> {
        let pass1 = compile_pass1(score)?;
        let pass2 = compile_pass2(&pass1, self.timing.settle_delay_samples());
        let total_samples = pass2
            .last_sample_time()
            .unwrap_or(0)
            .saturating_add(self.timing.duration_to_samples(self.tail));

        info!(
            pass1 = pass1.len(),
            pass2 = pass2.len(),
            total_samples,
            duration = duration_minutes_seconds(self.timing.samples_to_duration(total_samples)),
            "Compiled sequence."
        );

        Ok(CompiledSequence {
            pass1,
            pass2,
            total_samples,
        })
    }

    fn context(
        &self,
        compiled: &CompiledSequence,
        resampler: Box<dyn resampler::RateConverter>,
        capture: bool,
    ) -> AudioContext<Ym2151> {
        AudioContext::new(
            Ym2151::new(self.timing),
            self.timing,
            compiled.pass2.clone(),
            compiled.total_samples,
            resampler,
            capture,
        )
    }

    fn report(&self, context: AudioContext<Ym2151>, cancelled: bool) -> PlaybackReport {
        let played = context.played();
        let total = context.total();
        let handshake_violations = context.chip().handshake_violations();

        PlaybackReport {
            played,
            total,
            native_rate: self.timing.native_rate(),
            handshake_violations,
            cancelled,
            capture: context.into_capture(),
        }
    }

    /// Plays the sequence on a device, blocking until it has finished or the
    /// cancel handle is cancelled.
    pub fn play(
        &self,
        compiled: &CompiledSequence,
        device: &dyn Device,
        capture: bool,
        cancel: &CancelHandle,
    ) -> Result<PlaybackReport, PlaybackError> {
        let span = span!(Level::INFO, "play sequence");
        let _enter = span.enter();

        let resampler = resampler::for_rates(self.timing.native_rate(), device.sample_rate())?;
        let mut context = self.context(compiled, resampler, capture);
        let status = context.status();
        context.start();

        let context = Arc::new(Mutex::new(context));
        let handler: RenderHandler = {
            let context = context.clone();
            Box::new(move |output: &mut [i16]| match context.try_lock() {
                // Failures are recorded in the status.
                Some(mut context) => {
                    let _ = context.render(output);
                }
                None => output.fill(0),
            })
        };

        info!(device = device.to_string(), "Starting playback.");
        let stream = device
            .start(handler)
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let mut cancelled = false;
        while status.is_playing() {
            if !stream.is_active() {
                status.stop();
                drop(stream);
                return Err(PlaybackError::Device(
                    "output stream stopped unexpectedly".to_string(),
                ));
            }
            if cancel.wait_timeout(POLL_INTERVAL) {
                info!(played = status.played(), "Playback cancelled.");
                status.stop();
                cancelled = true;
                break;
            }
            debug!(
                played = status.played(),
                total = status.total(),
                "Playing."
            );
        }
        drop(stream);

        if status.has_failed() {
            return Err(PlaybackError::Render);
        }

        let context = Arc::try_unwrap(context)
            .map_err(|_| PlaybackError::ContextStillShared)?
            .into_inner();
        info!(played = context.played(), "Playback finished.");
        Ok(self.report(context, cancelled))
    }

    /// Renders the sequence without a device.
    pub fn render(
        &self,
        compiled: &CompiledSequence,
        capture: bool,
    ) -> Result<PlaybackReport, PlaybackError> {
        let span = span!(Level::INFO, "render sequence");
        let _enter = span.enter();

        let mut context = self.context(compiled, Box::new(Passthrough), capture);
        context.start();
        context.render_offline(OFFLINE_FRAMES_PER_CALL)?;

        info!(played = context.played(), "Render finished.");
        Ok(self.report(context, false))
    }
}
