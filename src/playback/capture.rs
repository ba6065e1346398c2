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
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use crate::chip::StereoSample;
use crate::util::filename_display;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}

/// Reduces a native sample to 16 bits: halved, truncated toward zero, then saturated.
pub fn to_output_depth(sample: i32) -> i16 {
    (sample / 2).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Full precision native-rate frames, recorded as they are generated.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    /// Interleaved left/right.
    samples: Vec<i32>,
}

impl CaptureBuffer {
    /// Creates a buffer with room for `frames` stereo frames.
    pub fn with_capacity(frames: usize) -> CaptureBuffer {
        CaptureBuffer {
            samples: Vec::with_capacity(frames * 2),
        }
    }

    pub fn push(&mut self, sample: StereoSample) {
        self.samples.extend_from_slice(&sample);
    }

    /// Interleaved samples captured so far.
    pub fn frames(&self) -> &[i32] {
        &self.samples
    }

    /// Number of stereo frames captured, which is also the next write position.
    pub fn position(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts the capture to interleaved 16-bit samples.
    pub fn to_output_samples(&self) -> Vec<i16> {
        self.samples.iter().copied().map(to_output_depth).collect()
    }

    /// Writes a 16-bit stereo PCM WAV file at the given rate.
    pub fn write_wav(&self, path: &Path, sample_rate: u32) -> Result<(), CaptureError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for sample in &self.samples {
            writer.write_sample(to_output_depth(*sample))?;
        }
        writer.finalize()?;

        info!(
            file = filename_display(path),
            frames = self.position(),
            sample_rate,
            "Saved capture."
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_output_depth() {
        assert_eq!(to_output_depth(0), 0);
        assert_eq!(to_output_depth(1), 0);
        assert_eq!(to_output_depth(-1), 0);
        assert_eq!(to_output_depth(3), 1);
        assert_eq!(to_output_depth(-3), -1);
        assert_eq!(to_output_depth(65535), 32767);
        assert_eq!(to_output_depth(-65536), -32768);
        assert_eq!(to_output_depth(100_000), 32767);
        assert_eq!(to_output_depth(-100_000), -32768);
    }

    #[test]
    fn test_push_and_position() {
        let mut capture = CaptureBuffer::with_capacity(4);
        assert!(capture.is_empty());
        capture.push([10, -10]);
        capture.push([7, -7]);
        assert_eq!(capture.position(), 2);
        assert_eq!(capture.frames(), &[10, -10, 7, -7]);
        assert_eq!(capture.to_output_samples(), vec![5, -5, 3, -3]);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let mut capture = CaptureBuffer::with_capacity(1000);
        for i in 0..1000 {
            capture.push([i * 131 - 65536, 65535 - i * 97]);
        }
        capture.write_wav(&path, 55930).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 55930);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert_eq!(reader.duration(), 1000);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, capture.to_output_samples());
    }
}
