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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use tracing::{info, span, Level};

use crate::audio::{ActiveStream, RenderHandler};
use crate::config;

const DEFAULT_PERIOD_FRAMES: usize = 512;

/// A mock device. Pulls periods from the handler as fast as it can and throws them away.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    period_frames: usize,
    periods: Arc<AtomicU64>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, config: &config::Audio) -> Device {
        Device {
            name: name.to_string(),
            sample_rate: config.sample_rate(),
            period_frames: config
                .buffer_size()
                .map(|frames| frames as usize)
                .unwrap_or(DEFAULT_PERIOD_FRAMES)
                .max(1),
            periods: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of periods pulled from handlers so far.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }
}

struct Stream {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ActiveStream for Stream {
    fn is_active(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl crate::audio::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, mut handler: RenderHandler) -> Result<Box<dyn ActiveStream>, Box<dyn Error>> {
        let span = span!(Level::INFO, "start stream (mock)");
        let _enter = span.enter();

        info!(
            device = self.name,
            period_frames = self.period_frames,
            "Starting mock stream."
        );

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            let periods = self.periods.clone();
            let mut buffer = vec![0i16; self.period_frames * 2];
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    handler(&mut buffer);
                    periods.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                }
            })
        };

        Ok(Box::new(Stream {
            stop,
            thread: Some(thread),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::Device as _;
    use crate::testutil::eventually;

    #[test]
    fn test_pulls_until_dropped() {
        let mut config = config::Audio::new("mock-device");
        config.set_buffer_size(64);
        let device = Device::get("mock-device", &config);
        assert_eq!(device.sample_rate(), 48000);
        assert_eq!(device.to_string(), "mock-device (Mock)");

        let frames = Arc::new(AtomicUsize::new(0));
        let stream = {
            let frames = frames.clone();
            device
                .start(Box::new(move |buffer: &mut [i16]| {
                    frames.fetch_add(buffer.len() / 2, Ordering::Relaxed);
                }))
                .unwrap()
        };

        eventually(|| device.periods() >= 10, "mock device never pulled 10 periods");
        assert!(stream.is_active());
        drop(stream);

        let pulled = device.periods();
        assert_eq!(frames.load(Ordering::Relaxed), pulled as usize * 64);
        assert_eq!(device.periods(), pulled);
    }
}
